//! 改写管道模块
//!
//! 提供段落收集、候选过滤、批次协调、短语替换和还原

pub mod applier;
pub mod batch;
pub mod collector;
pub mod filters;
pub mod revert;

// 重新导出主要类型
pub use applier::{ensure_marker_styles, PhraseApplier};
pub use batch::{BatchCoordinator, BatchOutcome, BatchStats, RuleGroup};
pub use collector::{extract_blocks, BlockCollector, BlockId, CollectorConfig, TextBlock};
pub use filters::{might_match, CandidateFilter};
pub use revert::revert;
