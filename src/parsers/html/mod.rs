//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（解析、属性、节点增删、文本规整）
//! - `metadata`: 字符集声明的读取、改写与按声明解码
//! - `serializer`: 序列化功能
//! - `style`: 内联样式解析与继承

pub mod dom;
pub mod metadata;
pub mod serializer;
pub mod style;

pub use dom::{
    append_child, create_element, create_text_node, find_elements, get_child_node_by_name,
    get_node_attr, get_node_name, get_parent_node, has_class, html_to_dom, is_text_node,
    normalize_text_nodes, replace_with, set_node_attr, text_content, text_of,
};
pub use metadata::{get_charset, html_to_dom_detect, set_charset};
pub use serializer::{serialize_document, serialize_node};
pub use style::{format_declarations, inherited_text_style, is_display_none};
