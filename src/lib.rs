//! # Lexa Library
//!
//! 在网页中把表达某个概念的短语替换为用户正在学习的目标词，并保留还原所需的全部信息。
//!
//! ## 模块组织
//!
//! - `env` - 类型化的环境变量访问
//! - `parsers` - HTML 解析、DOM 操作、内联样式和序列化
//! - `rewrite` - 段落收集、批量分析、短语替换、还原与自动处理

pub mod env;
pub mod parsers;
pub mod rewrite;

// Re-export commonly used items for convenience
pub use parsers::{html_to_dom, serialize_document};
pub use rewrite::{
    Command, CommandOutcome, ProcessOutcome, ReplacementRule, RevertOutcome, RewriteConfig,
    RewriteError, RewriteResult, RewriteService, Settings,
};
