//! 改写服务核心实现
//!
//! 本模块提供统一的改写服务接口，管理页面会话并协调段落收集、批次分析、
//! 短语替换与还原。它是命令分发、自动处理触发器和命令行工具共同的入口。
//!
//! ## 幂等性
//!
//! 处理流程由多个相互独立的来源触发（手动命令、内容变化、设置变更、页面加载）。
//! 服务用两层状态保证同一页面不会被重复改写：
//!
//! 1. **持久化的标签页标记**: 完成一次处理后写入设置存储，后续请求直接报告 `already_processed`
//! 2. **单飞守卫**: 在第一次挂起之前同步登记处理中的标签页，
//!    并发触发在标记写入前到达时同样报告 `already_processed`
//!
//! 标签页标记在还原、导航（重新打开页面）和关闭页面时清除。
//!
//! ## 执行模型
//!
//! 服务和会话持有 `Rc` DOM，只能在单线程运行时（`current_thread`）中使用。
//! 挂起只发生在分析请求和设置存储读写处，其余步骤在一次轮转内完成。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::session::PageSession;
use crate::parsers::html::html_to_dom_detect;
use crate::rewrite::analyzer::{Analyzer, ConceptExtractor, GeminiAnalyzer, PhrasePair};
use crate::rewrite::config::{constants, RewriteConfig};
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::pipeline::{BatchCoordinator, BlockCollector, CollectorConfig, PhraseApplier};
use crate::rewrite::rules::{validate_rules, ReplacementRule, RuleList};
use crate::rewrite::storage::Settings;

/// 处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub replacements_made: usize,
    pub already_processed: bool,
}

impl ProcessOutcome {
    fn already_processed() -> Self {
        Self {
            replacements_made: 0,
            already_processed: true,
        }
    }
}

/// 还原结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertOutcome {
    pub reverted_count: usize,
}

/// 服务统计
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 完成的处理次数
    pub passes_completed: AtomicUsize,
    /// 因已处理或处理中而跳过的请求
    pub duplicate_triggers: AtomicUsize,
    /// 中途因页面失效而放弃的处理
    pub passes_aborted: AtomicUsize,
    pub replacements_made: AtomicUsize,
    pub reverted: AtomicUsize,
}

impl ServiceStats {
    pub fn inc_passes_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate_triggers(&self) {
        self.duplicate_triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_aborted(&self) {
        self.passes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_replacements(&self, count: usize) {
        self.replacements_made.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_reverted(&self, count: usize) {
        self.reverted.fetch_add(count, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Page,
    NewBlocks,
}

/// 处理中的标签页登记，离开作用域时自动注销
struct InFlightGuard<'a> {
    tabs: &'a RefCell<HashSet<String>>,
    tab_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(tabs: &'a RefCell<HashSet<String>>, tab_id: &str) -> Option<Self> {
        if !tabs.borrow_mut().insert(tab_id.to_string()) {
            return None;
        }
        Some(Self {
            tabs,
            tab_id: tab_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tabs.borrow_mut().remove(&self.tab_id);
    }
}

/// 统一的改写服务
pub struct RewriteService {
    config: RewriteConfig,
    settings: Settings,
    analyzer: Arc<dyn Analyzer>,
    extractor: Arc<dyn ConceptExtractor>,
    coordinator: BatchCoordinator,
    collector: RefCell<BlockCollector>,
    sessions: RefCell<HashMap<String, Rc<PageSession>>>,
    in_flight: RefCell<HashSet<String>>,
    stats: ServiceStats,
}

impl RewriteService {
    /// 创建服务
    pub fn new(
        config: RewriteConfig,
        settings: Settings,
        analyzer: Arc<dyn Analyzer>,
        extractor: Arc<dyn ConceptExtractor>,
    ) -> RewriteResult<Self> {
        config.validate()?;

        let coordinator =
            BatchCoordinator::new(config.chunk_size, PhraseApplier::new(config.marker_class.clone()))
                .with_timeout(config.analyzer_timeout());
        let collector = BlockCollector::new(CollectorConfig::with_block_tags(&config.block_tags));

        Ok(Self {
            config,
            settings,
            analyzer,
            extractor,
            coordinator,
            collector: RefCell::new(collector),
            sessions: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(HashSet::new()),
            stats: ServiceStats::default(),
        })
    }

    /// 使用 Gemini 分析服务创建
    pub fn with_gemini(config: RewriteConfig, settings: Settings) -> RewriteResult<Self> {
        let gemini = Arc::new(GeminiAnalyzer::new(&config, settings.clone())?);
        Self::new(config, settings, gemini.clone(), gemini)
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get_stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.coordinator
    }

    /// 当前打开的标签页
    pub fn open_tabs(&self) -> Vec<String> {
        let mut tabs: Vec<String> = self.sessions.borrow().keys().cloned().collect();
        tabs.sort();
        tabs
    }

    pub fn session(&self, tab_id: &str) -> Option<Rc<PageSession>> {
        self.sessions.borrow().get(tab_id).cloned()
    }

    fn require_session(&self, tab_id: &str) -> RewriteResult<Rc<PageSession>> {
        self.session(tab_id)
            .ok_or_else(|| RewriteError::InvalidInput(format!("标签页未打开: {}", tab_id)))
    }

    /// 打开页面（或在同一标签页中导航到新页面）
    ///
    /// 旧会话立即失效，标签页的已处理标记被清除。
    pub async fn open_page(&self, tab_id: &str, html: &[u8], url: Option<&str>) -> RewriteResult<()> {
        let url = url.map(parse_page_url).transpose()?;

        if let Some(previous) = self.sessions.borrow_mut().remove(tab_id) {
            previous.invalidate();
        }

        let dom = html_to_dom_detect(html)
            .map_err(|e| RewriteError::ParseError(format!("HTML解析失败: {}", e)))?;

        self.settings.clear_tab_processed(tab_id).await?;

        let session = Rc::new(PageSession::new(tab_id, dom, url));
        // 等待期间可能有另一次导航抢先登记
        if let Some(previous) = self.sessions.borrow_mut().insert(tab_id.to_string(), session) {
            previous.invalidate();
        }
        tracing::info!("打开页面: 标签页 {}", tab_id);
        Ok(())
    }

    /// 关闭页面，返回标签页是否存在
    pub async fn close_page(&self, tab_id: &str) -> RewriteResult<bool> {
        let removed = self.sessions.borrow_mut().remove(tab_id);
        match removed {
            Some(session) => {
                session.invalidate();
                self.settings.clear_tab_processed(tab_id).await?;
                tracing::info!("关闭页面: 标签页 {}", tab_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 处理页面
    ///
    /// `rules` 为空时使用存储中的规则列表。已处理或正在处理的标签页直接返回
    /// `already_processed = true`。缺少凭据时在任何外部请求前失败。
    pub async fn process_page(
        &self,
        tab_id: &str,
        rules: Option<Vec<ReplacementRule>>,
    ) -> RewriteResult<ProcessOutcome> {
        self.run_pass(tab_id, rules, PassKind::Page).await
    }

    /// 处理页面上尚未处理的段落（动态插入的内容、规则变更后的重跑）
    ///
    /// 不检查标签页标记：已处理段落由会话的段落集合排除，只有新段落会被分析。
    /// 正在处理中的标签页仍然报告 `already_processed`。
    pub async fn process_new_blocks(&self, tab_id: &str) -> RewriteResult<ProcessOutcome> {
        self.run_pass(tab_id, None, PassKind::NewBlocks).await
    }

    /// 分析服务是否可用（凭据已设置等）
    pub async fn check_ready(&self) -> RewriteResult<()> {
        self.analyzer.check_ready().await
    }

    /// 向页面追加内容，返回追加的顶层节点数
    pub fn append_content(&self, tab_id: &str, html: &str) -> RewriteResult<usize> {
        self.require_session(tab_id)?.append_content(html)
    }

    async fn run_pass(
        &self,
        tab_id: &str,
        rules: Option<Vec<ReplacementRule>>,
        kind: PassKind,
    ) -> RewriteResult<ProcessOutcome> {
        let session = self.require_session(tab_id)?;
        session.ensure_alive()?;

        // 必须在第一次挂起之前登记
        let _guard = match InFlightGuard::acquire(&self.in_flight, tab_id) {
            Some(guard) => guard,
            None => {
                tracing::debug!("标签页 {} 正在处理中，忽略重复请求", tab_id);
                self.stats.inc_duplicate_triggers();
                return Ok(ProcessOutcome::already_processed());
            }
        };

        if kind == PassKind::Page && self.settings.is_tab_processed(tab_id).await? {
            tracing::debug!("标签页 {} 已处理过", tab_id);
            self.stats.inc_duplicate_triggers();
            return Ok(ProcessOutcome::already_processed());
        }

        let rules = match rules {
            Some(rules) => rules,
            None => self.settings.rules().await?.into_vec(),
        };
        validate_rules(&rules)?;
        if rules.is_empty() {
            tracing::info!("没有替换规则，跳过标签页 {}", tab_id);
            return Ok(ProcessOutcome::default());
        }

        self.analyzer.check_ready().await?;

        let blocks = session.extract_blocks(&mut self.collector.borrow_mut())?;
        let outcome = self
            .coordinator
            .process_blocks(&session, self.analyzer.as_ref(), blocks, &rules)
            .await;

        if outcome.aborted || !session.is_alive() {
            tracing::warn!("标签页 {} 在处理过程中失效，结果未记录", tab_id);
            self.stats.inc_passes_aborted();
            return Ok(ProcessOutcome {
                replacements_made: outcome.replacements,
                already_processed: false,
            });
        }

        if outcome.replacements > 0 {
            session.ensure_marker_styles(&self.config.marker_class)?;
            tracing::debug!(
                "{} 个新标记等待可见性登记",
                session.pending_marker_count()
            );
        }

        self.settings.set_tab_processed(tab_id).await?;
        self.stats.inc_passes_completed();
        self.stats.add_replacements(outcome.replacements);
        tracing::info!("标签页 {} 处理完成: {} 处替换", tab_id, outcome.replacements);

        Ok(ProcessOutcome {
            replacements_made: outcome.replacements,
            already_processed: false,
        })
    }

    /// 还原页面并清除已处理标记
    pub async fn revert_page(&self, tab_id: &str) -> RewriteResult<RevertOutcome> {
        let session = self.require_session(tab_id)?;
        let reverted_count = session.revert(&self.config.marker_class)?;
        self.settings.clear_tab_processed(tab_id).await?;

        self.stats.add_reverted(reverted_count);
        tracing::info!("标签页 {} 还原了 {} 处替换", tab_id, reverted_count);
        Ok(RevertOutcome { reverted_count })
    }

    /// 序列化页面当前 HTML
    pub fn snapshot(&self, tab_id: &str) -> RewriteResult<String> {
        let bytes = self.require_session(tab_id)?.serialize("utf-8")?;
        String::from_utf8(bytes)
            .map_err(|e| RewriteError::SerializationError(format!("文档不是有效UTF-8: {}", e)))
    }

    /// 单段文本分析（旧版接口）
    pub async fn analyze_text(
        &self,
        text: &str,
        concepts: &[String],
        replacement: &str,
    ) -> RewriteResult<Vec<PhrasePair>> {
        if concepts.iter().all(|c| c.trim().is_empty()) {
            return Err(RewriteError::InvalidInput("至少需要一个概念".to_string()));
        }
        self.analyzer.check_ready().await?;
        self.analyzer.analyze_one(text, concepts, replacement).await
    }

    /// 通过概念提取添加规则并保存
    pub async fn add_rule(&self, word: &str) -> RewriteResult<ReplacementRule> {
        let mut rules = self.settings.rules().await?;
        let rule = rules.add_rule(word, self.extractor.as_ref()).await?;
        self.settings.save_rules(&rules).await?;
        Ok(rule)
    }

    /// 删除规则，返回是否存在
    pub async fn remove_rule(&self, rule_id: &str) -> RewriteResult<bool> {
        let mut rules = self.settings.rules().await?;
        if !rules.remove_rule(rule_id) {
            return Ok(false);
        }
        self.settings.save_rules(&rules).await?;
        tracing::info!("删除规则 {}", rule_id);
        Ok(true)
    }

    pub async fn list_rules(&self) -> RewriteResult<RuleList> {
        self.settings.rules().await
    }
}

/// 解析页面地址，拒绝浏览器内部页面
fn parse_page_url(raw: &str) -> RewriteResult<Url> {
    let url = Url::parse(raw).map_err(|e| RewriteError::InvalidInput(format!("页面地址无效: {}", e)))?;
    if constants::RESTRICTED_SCHEMES.contains(&url.scheme()) {
        return Err(RewriteError::InvalidInput(format!(
            "不能改写浏览器内部页面: {}",
            raw
        )));
    }
    Ok(url)
}
