//! 离线字面匹配分析器
//!
//! 不访问网络：按整词、忽略 ASCII 大小写查找规则概念在段落中的出现，
//! 原样返回文本中的短语，替换形式直接使用规则的替换词。

use async_trait::async_trait;

use super::{AnalysisResult, Analyzer, ConceptExtractor, PhrasePair, RawMatch};
use crate::rewrite::error::RewriteResult;
use crate::rewrite::rules::ReplacementRule;

#[derive(Debug, Clone, Default)]
pub struct LiteralAnalyzer;

impl LiteralAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

/// 查找文本中与概念匹配的短语（保留文本原有大小写，去重）
pub fn find_phrases(text: &str, concepts: &[String]) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    for concept in concepts {
        let needle = concept.trim();
        if needle.is_empty() {
            continue;
        }
        for (start, end) in find_word_ignore_case(text, needle) {
            let phrase = &text[start..end];
            if !phrases.iter().any(|p| p == phrase) {
                phrases.push(phrase.to_string());
            }
        }
    }
    phrases
}

fn find_word_ignore_case(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut start = 0;

    while start + needle.len() <= haystack.len() {
        let end = start + needle.len();
        if haystack.is_char_boundary(start)
            && haystack.is_char_boundary(end)
            && haystack[start..end].eq_ignore_ascii_case(needle)
            && is_word_edge(haystack[..start].chars().next_back())
            && is_word_edge(haystack[end..].chars().next())
        {
            found.push((start, end));
            start = end;
        } else {
            start += 1;
        }
    }
    found
}

fn is_word_edge(neighbor: Option<char>) -> bool {
    !neighbor.map(char::is_alphanumeric).unwrap_or(false)
}

#[async_trait]
impl Analyzer for LiteralAnalyzer {
    async fn analyze_batch(
        &self,
        blocks: &[String],
        rules: &[ReplacementRule],
    ) -> RewriteResult<AnalysisResult> {
        let mut results = Vec::new();
        for (index, text) in blocks.iter().enumerate() {
            for rule in rules {
                for phrase in find_phrases(text, rule.concepts()) {
                    results.push(RawMatch::new(index as i64, &rule.id, &phrase, &rule.replacement));
                }
            }
        }
        Ok(AnalysisResult::new(results))
    }

    async fn analyze_one(
        &self,
        text: &str,
        concepts: &[String],
        replacement: &str,
    ) -> RewriteResult<Vec<PhrasePair>> {
        Ok(find_phrases(text, concepts)
            .into_iter()
            .map(|phrase| PhrasePair::new(phrase, replacement))
            .collect())
    }
}

#[async_trait]
impl ConceptExtractor for LiteralAnalyzer {
    /// 离线模式下替换词本身即为唯一概念
    async fn extract_concepts(&self, word: &str) -> RewriteResult<Vec<String>> {
        Ok(vec![word.trim().to_string()])
    }
}
