//! 替换规则
//!
//! 规则把一个或多个原始概念映射到用户想学习的目标词。

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::rewrite::analyzer::ConceptExtractor;
use crate::rewrite::error::{RewriteError, RewriteResult};

/// 替换规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    pub id: String,
    /// 原始概念，旧版数据中为单个字符串
    #[serde(deserialize_with = "one_or_many")]
    pub original: Vec<String>,
    pub replacement: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(concept) => vec![concept],
        OneOrMany::Many(concepts) => concepts,
    })
}

impl ReplacementRule {
    pub fn new(id: impl Into<String>, original: Vec<String>, replacement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original,
            replacement: replacement.into(),
        }
    }

    /// 原始概念列表
    pub fn concepts(&self) -> &[String] {
        &self.original
    }
}

/// 有序规则列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList {
    rules: Vec<ReplacementRule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<ReplacementRule>) -> Self {
        Self { rules }
    }

    pub fn as_slice(&self) -> &[ReplacementRule] {
        &self.rules
    }

    pub fn into_vec(self) -> Vec<ReplacementRule> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ReplacementRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// 验证规则列表
    pub fn validate(&self) -> RewriteResult<()> {
        validate_rules(&self.rules)
    }

    /// 通过概念提取创建新规则并追加到列表末尾
    ///
    /// 概念提取失败时不会修改列表。
    pub async fn add_rule(
        &mut self,
        word: &str,
        extractor: &dyn ConceptExtractor,
    ) -> RewriteResult<ReplacementRule> {
        let word = word.trim();
        if word.is_empty() {
            return Err(RewriteError::InvalidInput("替换词不能为空".to_string()));
        }

        let concepts = extractor
            .extract_concepts(word)
            .await
            .map_err(|e| e.with_context(format!("提取概念: {}", word)))?;
        if concepts.is_empty() {
            return Err(RewriteError::ParseError(format!("未能为 '{}' 提取到概念", word)));
        }

        let rule = ReplacementRule::new(self.next_id(), concepts, word);
        tracing::info!("添加规则 {}: {:?} → {}", rule.id, rule.original, rule.replacement);
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// 按 id 删除规则，返回是否删除
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        before != self.rules.len()
    }

    /// 基于毫秒时间戳生成唯一 id
    fn next_id(&self) -> String {
        let mut candidate = chrono::Utc::now().timestamp_millis();
        while self.get(&candidate.to_string()).is_some() {
            candidate += 1;
        }
        candidate.to_string()
    }
}

impl From<Vec<ReplacementRule>> for RuleList {
    fn from(rules: Vec<ReplacementRule>) -> Self {
        Self::from_rules(rules)
    }
}

/// 验证规则：id 非空且唯一、概念非空、替换词非空
pub fn validate_rules(rules: &[ReplacementRule]) -> RewriteResult<()> {
    let mut seen = HashSet::new();

    for rule in rules {
        if rule.id.trim().is_empty() {
            return Err(RewriteError::InvalidInput("规则 id 不能为空".to_string()));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(RewriteError::InvalidInput(format!("规则 id 重复: {}", rule.id)));
        }
        if rule.original.is_empty() {
            return Err(RewriteError::InvalidInput(format!("规则 {} 缺少原始概念", rule.id)));
        }
        if rule.replacement.trim().is_empty() {
            return Err(RewriteError::InvalidInput(format!("规则 {} 缺少替换词", rule.id)));
        }
    }

    Ok(())
}
