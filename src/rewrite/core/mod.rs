//! 改写系统核心模块
//!
//! 本模块把段落收集、批次分析、短语替换与还原组织成面向页面的服务，
//! 并负责跨多次触发的幂等保证。
//!
//! ## 架构设计
//!
//! - **会话层** (`session.rs`): 持有页面 DOM 与已处理段落集合，页面失效后拒绝任何访问
//! - **服务层** (`service.rs`): 管理所有打开的页面，检查并写入持久化的标签页标记
//! - **触发层** (`trigger.rs`): 把页面加载、内容变化、设置变更转换为处理调用
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lexa::rewrite::{RewriteConfig, RewriteService, Settings, MemoryStore};
//!
//! let settings = Settings::new(Arc::new(MemoryStore::new()));
//! let service = RewriteService::with_gemini(RewriteConfig::default(), settings)?;
//!
//! service.open_page("1", html.as_bytes(), Some("https://example.com")).await?;
//! let outcome = service.process_page("1", None).await?;
//! println!("替换了 {} 处", outcome.replacements_made);
//! ```
//!
//! ## 模块依赖关系
//!
//! ```text
//! AutoProcessTrigger (trigger.rs)
//!     └── RewriteService (service.rs)
//!             ├── PageSession (session.rs)
//!             ├── BlockCollector (pipeline/collector.rs)
//!             ├── BatchCoordinator (pipeline/batch.rs)
//!             │       ├── CandidateFilter (pipeline/filters.rs)
//!             │       └── PhraseApplier (pipeline/applier.rs)
//!             ├── Analyzer / ConceptExtractor (analyzer/)
//!             └── Settings (storage/settings.rs)
//! ```

pub mod service;
pub mod session;
pub mod trigger;

/// 统一改写服务 - 主要的对外接口
pub use service::RewriteService;

/// 处理与还原的结果
pub use service::{ProcessOutcome, RevertOutcome};

/// 服务运行统计信息
pub use service::ServiceStats;

pub use session::PageSession;
pub use trigger::{AutoProcessTrigger, TriggerEvent, TriggerHandle};
