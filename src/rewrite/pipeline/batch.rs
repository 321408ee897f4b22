//! 批次协调模块
//!
//! 将候选段落按固定大小分块，每块发起一次包含全部规则的分析请求，
//! 再把结果按段落、按规则分发给短语替换器。
//!
//! ## 失败处理
//!
//! 单个分块的分析失败（网络、状态码、响应格式、超时）只影响该分块：
//! 分块内的段落照样标记为已处理，然后继续下一个分块。
//! 结果中越界、缺字段或引用未知规则的匹配会被静默丢弃。

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::rewrite::analyzer::{AnalysisResult, Analyzer, PhrasePair, RawMatch};
use crate::rewrite::config::constants;
use crate::rewrite::core::session::PageSession;
use crate::rewrite::error::{helpers, RewriteError, RewriteResult};
use crate::rewrite::pipeline::applier::PhraseApplier;
use crate::rewrite::pipeline::collector::TextBlock;
use crate::rewrite::pipeline::filters::CandidateFilter;
use crate::rewrite::rules::ReplacementRule;

/// 某个段落中某条规则的全部短语
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    pub rule_id: String,
    pub pairs: Vec<PhrasePair>,
}

/// 批次统计
///
/// 使用 `Relaxed` 内存序，仅用于统计。
#[derive(Debug, Default)]
pub struct BatchStats {
    /// 参与过滤的段落数
    pub input_blocks: AtomicUsize,
    /// 通过过滤的段落数
    pub candidate_blocks: AtomicUsize,
    /// 发出的分析请求数
    pub requests: AtomicUsize,
    /// 失败的分块数
    pub failed_chunks: AtomicUsize,
    /// 被丢弃的匹配数
    pub discarded_matches: AtomicUsize,
    /// 插入的替换标记数
    pub replacements: AtomicUsize,
}

impl BatchStats {
    pub fn add_input_blocks(&self, count: usize) {
        self.input_blocks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_candidate_blocks(&self, count: usize) {
        self.candidate_blocks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_chunks(&self) {
        self.failed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_discarded_matches(&self, count: usize) {
        self.discarded_matches.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_replacements(&self, count: usize) {
        self.replacements.fetch_add(count, Ordering::Relaxed);
    }
}

/// 一次处理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub replacements: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    /// 会话中途失效，处理提前结束
    pub aborted: bool,
}

/// 批次协调器
pub struct BatchCoordinator {
    chunk_size: usize,
    timeout: Option<Duration>,
    applier: PhraseApplier,
    stats: BatchStats,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(constants::CHUNK_SIZE, PhraseApplier::default())
    }
}

impl BatchCoordinator {
    pub fn new(chunk_size: usize, applier: PhraseApplier) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            timeout: None,
            applier,
            stats: BatchStats::default(),
        }
    }

    /// 单次分析请求的超时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn applier(&self) -> &PhraseApplier {
        &self.applier
    }

    pub fn get_stats(&self) -> &BatchStats {
        &self.stats
    }

    /// 过滤掉已处理和不可能命中的段落，并按顺序分块
    pub fn plan_chunks(
        &self,
        session: &PageSession,
        blocks: Vec<TextBlock>,
        rules: &[ReplacementRule],
    ) -> Vec<Vec<TextBlock>> {
        self.stats.add_input_blocks(blocks.len());
        let filter = CandidateFilter::new(rules);

        let candidates: Vec<TextBlock> = blocks
            .into_iter()
            .filter(|block| !session.is_processed(block) && filter.might_match(&block.text))
            .collect();
        self.stats.add_candidate_blocks(candidates.len());

        candidates
            .chunks(self.chunk_size)
            .map(<[TextBlock]>::to_vec)
            .collect()
    }

    /// 处理段落，返回替换总数等结果
    ///
    /// 分块依次串行处理，同一页面同时最多只有一个分析请求。
    pub async fn process_blocks(
        &self,
        session: &PageSession,
        analyzer: &dyn Analyzer,
        blocks: Vec<TextBlock>,
        rules: &[ReplacementRule],
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if rules.is_empty() {
            return outcome;
        }

        let chunks = self.plan_chunks(session, blocks, rules);
        tracing::debug!("共 {} 个分块待分析（每块最多 {} 个段落）", chunks.len(), self.chunk_size);

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            outcome.chunks += 1;

            match self.process_chunk(session, analyzer, chunk, rules).await {
                Ok(count) => outcome.replacements += count,
                Err(RewriteError::ContextInvalidated(reason)) => {
                    tracing::warn!("页面已失效，停止处理: {}", reason);
                    outcome.aborted = true;
                    break;
                }
                Err(e) => {
                    outcome.failed_chunks += 1;
                    self.stats.inc_failed_chunks();
                    helpers::log_error(&e.with_context(format!("分块 {}", chunk_index)));

                    // 保证前进：失败分块中的段落也标记为已处理
                    if let Err(e) = self.mark_all(session, chunk) {
                        tracing::warn!("页面已失效，停止处理: {}", e);
                        outcome.aborted = true;
                        break;
                    }
                }
            }
        }

        self.stats.add_replacements(outcome.replacements);
        tracing::info!(
            "处理完成: {} 个分块, {} 个失败, {} 处替换",
            outcome.chunks,
            outcome.failed_chunks,
            outcome.replacements
        );
        outcome
    }

    async fn process_chunk(
        &self,
        session: &PageSession,
        analyzer: &dyn Analyzer,
        chunk: &[TextBlock],
        rules: &[ReplacementRule],
    ) -> RewriteResult<usize> {
        let texts: Vec<String> = chunk.iter().map(|block| block.text.clone()).collect();

        session.ensure_alive()?;
        self.stats.inc_requests();
        let result = self.analyze(analyzer, &texts, rules).await?;
        // 请求期间页面可能已导航或关闭
        session.ensure_alive()?;

        let groups = self.group_matches(result, chunk.len(), rules);

        let mut count = 0;
        for (block, block_groups) in chunk.iter().zip(groups) {
            for group in &block_groups {
                count += session.apply_phrases(&self.applier, block, &group.pairs)?;
            }
            session.mark_processed(block)?;
        }
        Ok(count)
    }

    async fn analyze(
        &self,
        analyzer: &dyn Analyzer,
        texts: &[String],
        rules: &[ReplacementRule],
    ) -> RewriteResult<AnalysisResult> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, analyzer.analyze_batch(texts, rules))
                .await
                .map_err(|_| {
                    RewriteError::TimeoutError(format!("分析请求超过 {} 秒", timeout.as_secs()))
                })?,
            None => analyzer.analyze_batch(texts, rules).await,
        }
    }

    fn mark_all(&self, session: &PageSession, chunk: &[TextBlock]) -> RewriteResult<()> {
        for block in chunk {
            session.mark_processed(block)?;
        }
        Ok(())
    }

    /// 验证匹配并按段落、规则分组
    ///
    /// 返回长度为 `chunk_len` 的列表；规则分组保持首次出现的顺序。
    pub fn group_matches(
        &self,
        result: AnalysisResult,
        chunk_len: usize,
        rules: &[ReplacementRule],
    ) -> Vec<Vec<RuleGroup>> {
        let known_ids: HashSet<&str> = rules.iter().map(|rule| rule.id.as_str()).collect();
        let mut groups: Vec<Vec<RuleGroup>> = vec![Vec::new(); chunk_len];
        let mut discarded = 0;

        for raw in result.results {
            match validate_match(raw, chunk_len, &known_ids) {
                Some((index, rule_id, pair)) => {
                    let paragraph = &mut groups[index];
                    match paragraph.iter_mut().find(|g| g.rule_id == rule_id) {
                        Some(group) => group.pairs.push(pair),
                        None => paragraph.push(RuleGroup {
                            rule_id,
                            pairs: vec![pair],
                        }),
                    }
                }
                None => discarded += 1,
            }
        }

        if discarded > 0 {
            tracing::debug!("丢弃 {} 条无效匹配", discarded);
            self.stats.add_discarded_matches(discarded);
        }
        groups
    }
}

fn validate_match(
    raw: RawMatch,
    chunk_len: usize,
    known_ids: &HashSet<&str>,
) -> Option<(usize, String, PhrasePair)> {
    let index = usize::try_from(raw.paragraph_index?).ok()?;
    if index >= chunk_len {
        return None;
    }

    let rule_id = raw.rule_id.filter(|id| !id.is_empty())?;
    if !known_ids.contains(rule_id.as_str()) {
        return None;
    }

    let original = raw.original_phrase.filter(|p| !p.is_empty())?;
    let replacement = raw.replacement_form.filter(|r| !r.is_empty())?;
    Some((index, rule_id, PhrasePair::new(original, replacement)))
}
