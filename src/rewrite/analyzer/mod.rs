//! 外部分析服务接口
//!
//! - `gemini`: 基于 HTTP 的语言模型实现
//! - `prompts`: 提示词构造
//! - `literal`: 离线的字面匹配实现

pub mod gemini;
pub mod literal;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rewrite::error::RewriteResult;
use crate::rewrite::rules::ReplacementRule;

pub use gemini::GeminiAnalyzer;
pub use literal::LiteralAnalyzer;

/// 原始短语与替换形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhrasePair {
    pub original_phrase: String,
    pub replacement_form: String,
}

impl PhrasePair {
    pub fn new(original_phrase: impl Into<String>, replacement_form: impl Into<String>) -> Self {
        Self {
            original_phrase: original_phrase.into(),
            replacement_form: replacement_form.into(),
        }
    }
}

/// 分析服务返回的单条匹配，字段未经验证
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMatch {
    pub paragraph_index: Option<i64>,
    pub rule_id: Option<String>,
    pub original_phrase: Option<String>,
    pub replacement_form: Option<String>,
}

impl RawMatch {
    pub fn new(paragraph_index: i64, rule_id: &str, original_phrase: &str, replacement_form: &str) -> Self {
        Self {
            paragraph_index: Some(paragraph_index),
            rule_id: Some(rule_id.to_string()),
            original_phrase: Some(original_phrase.to_string()),
            replacement_form: Some(replacement_form.to_string()),
        }
    }

    /// 宽松解码：类型不符的字段视为缺失
    pub fn from_value(value: &Value) -> Self {
        let field = |snake: &str, camel: &str| value.get(snake).or_else(|| value.get(camel));

        Self {
            paragraph_index: field("paragraph_index", "paragraphIndex").and_then(as_index),
            rule_id: field("rule_id", "ruleId").and_then(as_id),
            original_phrase: field("original_phrase", "originalPhrase")
                .and_then(Value::as_str)
                .map(str::to_string),
            replacement_form: field("replacement_form", "replacementForm")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 批量分析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub results: Vec<RawMatch>,
}

impl AnalysisResult {
    pub fn new(results: Vec<RawMatch>) -> Self {
        Self { results }
    }

    /// 从响应 JSON 解码；`results` 缺失或不是数组时返回空结果
    pub fn from_json(payload: &Value) -> Self {
        let results = payload
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(RawMatch::from_value).collect())
            .unwrap_or_default();
        Self { results }
    }
}

/// 短语分析服务
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// 发起请求前的检查（例如凭据是否已设置）
    async fn check_ready(&self) -> RewriteResult<()> {
        Ok(())
    }

    /// 一次请求分析多个段落和全部规则
    async fn analyze_batch(
        &self,
        blocks: &[String],
        rules: &[ReplacementRule],
    ) -> RewriteResult<AnalysisResult>;

    /// 单段落、单规则的旧版接口
    async fn analyze_one(
        &self,
        text: &str,
        concepts: &[String],
        replacement: &str,
    ) -> RewriteResult<Vec<PhrasePair>>;
}

/// 概念提取服务，仅在创建规则时使用
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract_concepts(&self, word: &str) -> RewriteResult<Vec<String>>;
}
