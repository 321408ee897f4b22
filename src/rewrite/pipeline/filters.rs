//! 候选过滤器模块
//!
//! 在调用分析服务前做廉价的本地判断：段落是否可能包含某条规则的概念。
//! 允许误报（浪费一个批次名额），不应漏报。

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::rewrite::config::constants;
use crate::rewrite::rules::ReplacementRule;

/// 单个概念的预处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConceptNeedle {
    /// 长度大于阈值的小写词元，任一出现即命中
    Tokens(Vec<String>),
    /// 没有足够长的词元时，使用概念的前几个字符；空概念的前缀为空串，总是命中
    Prefix(String),
}

impl ConceptNeedle {
    fn from_concept(concept: &str) -> Self {
        let concept = concept.trim();
        let tokens: Vec<String> = concept
            .split_whitespace()
            .filter(|token| token.chars().count() > constants::MIN_TOKEN_LEN)
            .map(str::to_lowercase)
            .collect();

        if tokens.is_empty() {
            let prefix: String = concept
                .chars()
                .take(constants::FALLBACK_PREFIX_LEN)
                .collect();
            ConceptNeedle::Prefix(prefix.to_lowercase())
        } else {
            ConceptNeedle::Tokens(tokens)
        }
    }

    fn matches(&self, lowered_text: &str) -> bool {
        match self {
            ConceptNeedle::Tokens(tokens) => tokens.iter().any(|t| lowered_text.contains(t.as_str())),
            ConceptNeedle::Prefix(prefix) => lowered_text.contains(prefix.as_str()),
        }
    }
}

/// 过滤统计
#[derive(Debug, Default)]
pub struct FilterStats {
    pub checked: AtomicUsize,
    pub passed: AtomicUsize,
}

impl FilterStats {
    pub fn pass_rate(&self) -> f32 {
        let checked = self.checked.load(Ordering::Relaxed);
        if checked == 0 {
            0.0
        } else {
            self.passed.load(Ordering::Relaxed) as f32 / checked as f32
        }
    }
}

/// 候选过滤器，按规则列表预先计算匹配词元
#[derive(Debug)]
pub struct CandidateFilter {
    needles: Vec<ConceptNeedle>,
    stats: FilterStats,
}

impl CandidateFilter {
    pub fn new(rules: &[ReplacementRule]) -> Self {
        let needles = rules
            .iter()
            .flat_map(|rule| rule.concepts().iter())
            .map(|concept| ConceptNeedle::from_concept(concept))
            .collect();

        Self {
            needles,
            stats: FilterStats::default(),
        }
    }

    /// 判断文本是否值得发送给分析服务
    pub fn might_match(&self, text: &str) -> bool {
        self.stats.checked.fetch_add(1, Ordering::Relaxed);

        let lowered = text.to_lowercase();
        let matched = self.needles.iter().any(|needle| needle.matches(&lowered));
        if matched {
            self.stats.passed.fetch_add(1, Ordering::Relaxed);
        }
        matched
    }

    pub fn get_stats(&self) -> &FilterStats {
        &self.stats
    }
}

/// 便利函数
pub fn might_match(text: &str, rules: &[ReplacementRule]) -> bool {
    CandidateFilter::new(rules).might_match(text)
}
