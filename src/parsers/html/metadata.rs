//! 文档字符集声明
//!
//! 页面先按 UTF-8 解析，读取 `<meta charset>` 或 `http-equiv="content-type"` 声明后，
//! 必要时用声明的编码重新解码。解析后的文档在内存中是 UTF-8，声明也随之改写。

use encoding_rs::{Encoding, UTF_8};
use markup5ever_rcdom::{Handle, RcDom};

use super::dom::{get_child_node_by_name, get_node_attr, get_node_name, html_to_dom, set_node_attr};

/// `<head>` 中的 meta 元素
fn head_meta_nodes(document: &Handle) -> Vec<Handle> {
    let head = get_child_node_by_name(document, "html")
        .and_then(|html| get_child_node_by_name(&html, "head"));

    match head {
        Some(head) => head
            .children
            .borrow()
            .iter()
            .filter(|child| get_node_name(child) == Some("meta"))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

fn is_content_type_meta(node: &Handle) -> bool {
    get_node_attr(node, "http-equiv")
        .map(|value| value.eq_ignore_ascii_case("content-type"))
        .unwrap_or(false)
}

/// 从 `text/html; charset=...` 中取出字符集
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|charset| !charset.is_empty())
    })
}

/// 读取文档声明的字符集
pub fn get_charset(document: &Handle) -> Option<String> {
    for meta in head_meta_nodes(document) {
        if let Some(charset) = get_node_attr(&meta, "charset") {
            return Some(charset);
        }
        if is_content_type_meta(&meta) {
            if let Some(charset) = get_node_attr(&meta, "content")
                .as_deref()
                .and_then(charset_from_content_type)
            {
                return Some(charset);
            }
        }
    }
    None
}

/// 改写已有的字符集声明，返回是否找到声明
pub fn set_charset(document: &Handle, charset: &str) -> bool {
    for meta in head_meta_nodes(document) {
        if get_node_attr(&meta, "charset").is_some() {
            set_node_attr(&meta, "charset", Some(charset.to_string()));
            return true;
        }
        if is_content_type_meta(&meta) && get_node_attr(&meta, "content").is_some() {
            set_node_attr(&meta, "content", Some(format!("text/html; charset={}", charset)));
            return true;
        }
    }
    false
}

/// 按文档声明的字符集解析页面字节
///
/// 无法识别的标签退回 UTF-8；UTF-16 声明出现在字节流里时同样按 UTF-8 处理。
pub fn html_to_dom_detect(data: &[u8]) -> std::io::Result<RcDom> {
    let dom = html_to_dom(data, "utf-8")?;

    let declared = match get_charset(&dom.document) {
        Some(label) => label,
        None => return Ok(dom),
    };

    let encoding = match Encoding::for_label(declared.trim().as_bytes()) {
        Some(encoding) => encoding.output_encoding(),
        None => {
            tracing::warn!("无法识别的字符集声明: {}，按 UTF-8 解析", declared);
            return Ok(dom);
        }
    };

    let dom = if encoding == UTF_8 {
        dom
    } else {
        tracing::debug!("按声明的字符集 {} 重新解码页面", encoding.name());
        html_to_dom(data, encoding.name())?
    };

    if !declared.eq_ignore_ascii_case("utf-8") {
        set_charset(&dom.document, "utf-8");
    }
    Ok(dom)
}
