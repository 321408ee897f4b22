//! 存储模块
//!
//! 包含设置存储、类型化设置访问和分析结果缓存

pub mod cache;
pub mod settings;
pub mod store;

pub use cache::{AnalysisCache, CacheStats};
pub use settings::Settings;
pub use store::{FileStore, MemoryStore, SettingsStore, StoreChange};
