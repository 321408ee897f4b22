//! 改写模块
//!
//! 在网页段落中寻找表达某个概念的短语，替换为用户正在学习的目标词，并可完整还原：
//! - **core**: 页面会话、改写服务和自动处理触发器
//! - **pipeline**: 段落收集、候选过滤、批次协调、短语替换和还原
//! - **analyzer**: 外部分析服务接口及实现
//! - **storage**: 设置存储、类型化设置访问和分析结果缓存
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexa::rewrite::{MemoryStore, RewriteConfig, RewriteService, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::new(Arc::new(MemoryStore::new()));
//! settings.set_api_key("your-key").await?;
//!
//! let service = RewriteService::with_gemini(RewriteConfig::default(), settings)?;
//! service.open_page("1", b"<p>I am so happy today</p>", None).await?;
//!
//! let outcome = service.process_page("1", None).await?;
//! println!("{} 处替换", outcome.replacements_made);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 外部分析服务模块 - 批量短语分析与概念提取
pub mod analyzer;

/// 命令模块 - 带标签的命令与穷尽分发
pub mod commands;

/// 配置管理模块
pub mod config;

/// 核心模块 - 页面会话、改写服务和自动处理
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 改写管道模块 - 收集、过滤、批次、替换和还原
pub mod pipeline;

/// 替换规则模块
pub mod rules;

/// 存储模块 - 设置存储与分析结果缓存
pub mod storage;

// ============================================================================
// 公共接口重新导出
// ============================================================================

pub use analyzer::{
    AnalysisResult, Analyzer, ConceptExtractor, GeminiAnalyzer, LiteralAnalyzer, PhrasePair,
    RawMatch,
};
pub use commands::{Command, CommandOutcome};
pub use config::{ConfigManager, RewriteConfig};
pub use core::{
    AutoProcessTrigger, PageSession, ProcessOutcome, RevertOutcome, RewriteService, TriggerEvent,
    TriggerHandle,
};
pub use error::{RewriteError, RewriteResult};
pub use pipeline::{BatchCoordinator, BlockCollector, CandidateFilter, PhraseApplier, TextBlock};
pub use rules::{ReplacementRule, RuleList};
pub use storage::{FileStore, MemoryStore, Settings, SettingsStore, StoreChange};
