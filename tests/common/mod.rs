// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lexa::rewrite::analyzer::{AnalysisResult, Analyzer, LiteralAnalyzer, PhrasePair};
use lexa::rewrite::config::RewriteConfig;
use lexa::rewrite::error::RewriteResult;
use lexa::rewrite::rules::ReplacementRule;
use lexa::rewrite::storage::{MemoryStore, Settings};
use lexa::rewrite::RewriteService;

/// 一次记录下来的分析请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub blocks: Vec<String>,
    pub rule_count: usize,
}

/// 记录请求的分析服务
///
/// 有预设响应时按顺序返回，否则退回到字面匹配。
pub struct RecordingAnalyzer {
    requests: Mutex<Vec<RecordedRequest>>,
    scripted: Mutex<VecDeque<RewriteResult<AnalysisResult>>>,
    literal: LiteralAnalyzer,
    delay: Duration,
}

impl RecordingAnalyzer {
    pub fn literal() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            literal: LiteralAnalyzer::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn scripted(responses: Vec<RewriteResult<AnalysisResult>>) -> Self {
        let analyzer = Self::literal();
        *analyzer.scripted.lock().unwrap() = responses.into();
        analyzer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn analyze_batch(
        &self,
        blocks: &[String],
        rules: &[ReplacementRule],
    ) -> RewriteResult<AnalysisResult> {
        self.requests.lock().unwrap().push(RecordedRequest {
            blocks: blocks.to_vec(),
            rule_count: rules.len(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => self.literal.analyze_batch(blocks, rules).await,
        }
    }

    async fn analyze_one(
        &self,
        text: &str,
        concepts: &[String],
        replacement: &str,
    ) -> RewriteResult<Vec<PhrasePair>> {
        self.literal.analyze_one(text, concepts, replacement).await
    }
}

/// 测试环境
pub struct TestEnvironment {
    pub analyzer: Arc<RecordingAnalyzer>,
    pub service: RewriteService,
}

impl TestEnvironment {
    pub fn new(analyzer: RecordingAnalyzer) -> Self {
        Self::with_config(analyzer, RewriteConfig::default())
    }

    pub fn with_config(analyzer: RecordingAnalyzer, config: RewriteConfig) -> Self {
        let analyzer = Arc::new(analyzer);
        let settings = Settings::new(Arc::new(MemoryStore::new()));
        let service = RewriteService::new(
            config,
            settings,
            analyzer.clone(),
            Arc::new(LiteralAnalyzer::new()),
        )
        .expect("default config should be valid");
        Self { analyzer, service }
    }

    /// 打开页面并返回标签页 id
    pub async fn open(&self, tab_id: &str, html: &str) -> String {
        self.service
            .open_page(tab_id, html.as_bytes(), Some("https://example.com/article"))
            .await
            .expect("page should open");
        tab_id.to_string()
    }
}

/// HTML测试页面构造
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn page(body: &str) -> String {
        format!(
            "<!DOCTYPE html><html><head><title>Test Page</title></head><body>{}</body></html>",
            body
        )
    }

    pub fn paragraphs(texts: &[&str]) -> String {
        let body: String = texts.iter().map(|t| format!("<p>{}</p>", t)).collect();
        Self::page(&body)
    }

    pub fn numbered_paragraphs(count: usize, text: &str) -> String {
        let body: String = (0..count)
            .map(|i| format!("<p>{} {}</p>", text, i))
            .collect();
        Self::page(&body)
    }
}

/// 规则构造
pub struct RuleHelper;

impl RuleHelper {
    pub fn rule(id: &str, concepts: &[&str], replacement: &str) -> ReplacementRule {
        ReplacementRule::new(
            id,
            concepts.iter().map(|c| c.to_string()).collect(),
            replacement,
        )
    }

    pub fn happy() -> Vec<ReplacementRule> {
        vec![Self::rule("1", &["happy", "very happy"], "ecstatic")]
    }

    /// 第一条规则匹配 "happy"，其余规则的概念不会出现在页面中
    pub fn many(count: usize) -> Vec<ReplacementRule> {
        (0..count)
            .map(|i| {
                if i == 0 {
                    Self::rule("r0", &["happy"], "ecstatic")
                } else {
                    Self::rule(&format!("r{}", i), &[&format!("zzconcept{}", i)], "word")
                }
            })
            .collect()
    }
}
