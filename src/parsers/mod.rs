//! # 解析器模块
//!
//! 页面文档的解析、遍历、修改与序列化。
//!
//! - `html` - HTML文档解析、DOM操作、内联样式处理

pub mod html;

pub use html::{html_to_dom, serialize_document};
