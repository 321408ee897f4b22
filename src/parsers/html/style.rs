//! 内联样式解析
//!
//! 静态文档没有计算样式，这里沿祖先链读取内联 `style` 声明来近似继承样式。

use std::sync::OnceLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use super::dom::{get_node_attr, get_parent_node};

/// 替换标记需要继承的文本样式属性
pub const INHERITED_TEXT_PROPERTIES: &[&str] = &[
    "font-family",
    "font-size",
    "font-weight",
    "color",
    "line-height",
    "letter-spacing",
    "text-transform",
    "font-style",
];

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z-]+)\s*:\s*([^;]+)").expect("declaration pattern is a valid regex")
    })
}

/// 解析内联样式声明，属性名统一为小写
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    declaration_regex()
        .captures_iter(style)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim().to_lowercase();
            let value = caps.get(2)?.as_str().trim().to_string();
            (!value.is_empty()).then_some((name, value))
        })
        .collect()
}

/// 从节点开始向上查找继承的文本样式
///
/// 每个属性取离节点最近的声明；返回顺序与 `INHERITED_TEXT_PROPERTIES` 一致。
pub fn inherited_text_style(start: &Handle) -> Vec<(String, String)> {
    let mut resolved: Vec<Option<String>> = vec![None; INHERITED_TEXT_PROPERTIES.len()];
    let mut current = Some(start.clone());

    while let Some(node) = current {
        if let Some(style) = get_node_attr(&node, "style") {
            for (name, value) in parse_declarations(&style) {
                if let Some(i) = INHERITED_TEXT_PROPERTIES.iter().position(|p| *p == name) {
                    if resolved[i].is_none() {
                        resolved[i] = Some(value);
                    }
                }
            }
        }
        if resolved.iter().all(Option::is_some) {
            break;
        }
        current = get_parent_node(&node);
    }

    INHERITED_TEXT_PROPERTIES
        .iter()
        .zip(resolved)
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect()
}

/// 将声明列表格式化为 `style` 属性值
pub fn format_declarations(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{}: {};", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 判断内联样式是否让元素不参与布局
pub fn is_display_none(style: &str) -> bool {
    parse_declarations(style)
        .iter()
        .any(|(name, value)| name == "display" && value.to_lowercase().starts_with("none"))
}
