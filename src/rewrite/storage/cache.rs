//! 分析结果缓存
//!
//! 本地LRU缓存，键为段落文本与规则的哈希

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blake3::Hasher;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::rewrite::analyzer::AnalysisResult;
use crate::rewrite::rules::ReplacementRule;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// 缓存统计
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

/// 分析结果缓存
pub struct AnalysisCache {
    cache: Arc<Mutex<LruCache<String, AnalysisResult>>>,
    stats: CacheStats,
}

impl AnalysisCache {
    /// 创建新的缓存，容量为 0 时使用默认容量
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            stats: CacheStats::default(),
        }
    }

    /// 生成缓存键
    pub fn generate_key(blocks: &[String], rules: &[ReplacementRule]) -> String {
        let mut hasher = Hasher::new();
        for block in blocks {
            hasher.update(block.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[1]);
        for rule in rules {
            hasher.update(rule.id.as_bytes());
            hasher.update(&[0]);
            for concept in &rule.original {
                hasher.update(concept.as_bytes());
                hasher.update(&[0]);
            }
            hasher.update(rule.replacement.as_bytes());
            hasher.update(&[1]);
        }
        format!("analysis:{}", hasher.finalize().to_hex())
    }

    pub async fn get(&self, key: &str) -> Option<AnalysisResult> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some(result) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(result.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: String, result: AnalysisResult) {
        let mut cache = self.cache.lock().await;
        cache.put(key, result);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    pub fn get_stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::analyzer::RawMatch;

    fn rules() -> Vec<ReplacementRule> {
        vec![ReplacementRule::new("1", vec!["happy".to_string()], "ecstatic")]
    }

    #[test]
    fn test_key_depends_on_texts_and_rules() {
        let a = AnalysisCache::generate_key(&["ab".to_string(), "c".to_string()], &rules());
        let b = AnalysisCache::generate_key(&["a".to_string(), "bc".to_string()], &rules());
        let c = AnalysisCache::generate_key(&["ab".to_string(), "c".to_string()], &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("analysis:"));
    }

    #[tokio::test]
    async fn test_lru_eviction_and_stats() {
        let cache = AnalysisCache::new(2);
        let result = AnalysisResult::new(vec![RawMatch::new(0, "1", "happy", "ecstatic")]);

        cache.set("a".to_string(), result.clone()).await;
        cache.set("b".to_string(), AnalysisResult::default()).await;
        assert_eq!(cache.get("a").await, Some(result));
        cache.set("c".to_string(), AnalysisResult::default()).await;

        // "b" 最久未使用，被淘汰
        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.get_stats().misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.get_stats().hit_rate(), 0.5);
    }
}
