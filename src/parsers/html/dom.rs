use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> std::io::Result<RcDom> {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.to_string()
        }
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// rcdom 的父指针存放在 `Cell` 中，读取时必须放回，否则节点会丢失父引用。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    child.parent.set(weak.clone());
    weak.and_then(|node| node.upgrade())
}

/// 设置节点属性，`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let existing = attrs_mut
            .iter()
            .position(|attr| &*attr.name.local == attr_name);

        match (existing, attr_value) {
            (Some(i), Some(value)) => {
                attrs_mut[i].value.clear();
                attrs_mut[i].value.push_slice(value.as_str());
            }
            (Some(i), None) => {
                attrs_mut.remove(i);
            }
            (None, Some(value)) => attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: format_tendril!("{}", value),
            }),
            (None, None) => {}
        }
    }
}

/// 判断元素的 class 属性是否包含指定类名
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

/// 判断是否为文本节点
pub fn is_text_node(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 读取文本节点内容，非文本节点返回 `None`
pub fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 拼接节点下所有文本节点的内容（等价于 DOM 的 textContent）
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// 按文档顺序收集满足条件的元素
pub fn find_elements<F>(node: &Handle, predicate: &F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut found = Vec::new();
    find_elements_into(node, predicate, &mut found);
    found
}

fn find_elements_into<F>(node: &Handle, predicate: &F, found: &mut Vec<Handle>)
where
    F: Fn(&Handle) -> bool,
{
    if let NodeData::Element { .. } = node.data {
        if predicate(node) {
            found.push(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        find_elements_into(child, predicate, found);
    }
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 创建游离的文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 创建游离的元素节点
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: format_tendril!("{}", value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 将子节点追加到父节点末尾
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 用一组新节点替换指定节点，返回是否成功
///
/// 被替换的节点必须仍挂在父节点下；游离节点无法替换。
pub fn replace_with(target: &Handle, replacements: Vec<Handle>) -> bool {
    let parent = match get_parent_node(target) {
        Some(parent) => parent,
        None => return false,
    };

    let mut children = parent.children.borrow_mut();
    let index = match children.iter().position(|c| Rc::ptr_eq(c, target)) {
        Some(index) => index,
        None => return false,
    };

    for node in &replacements {
        node.parent.set(Some(Rc::downgrade(&parent)));
    }
    children.splice(index..=index, replacements);
    target.parent.set(None);
    true
}

/// 合并相邻文本节点并移除空文本节点（等价于 DOM 的 normalize，仅作用于直接子节点）
pub fn normalize_text_nodes(parent: &Handle) {
    let old_children: Vec<Handle> = parent.children.borrow_mut().drain(..).collect();
    let mut merged: Vec<Handle> = Vec::with_capacity(old_children.len());

    for child in old_children {
        if let NodeData::Text { contents } = &child.data {
            if contents.borrow().is_empty() {
                child.parent.set(None);
                continue;
            }
            if let Some(NodeData::Text { contents: previous }) = merged.last().map(|n| &n.data) {
                previous.borrow_mut().push_slice(&contents.borrow());
                child.parent.set(None);
                continue;
            }
        }
        merged.push(child);
    }

    *parent.children.borrow_mut() = merged;
}
