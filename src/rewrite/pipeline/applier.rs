//! 短语替换模块
//!
//! 在段落的文本节点中把原始短语替换为带标记的替换形式，
//! 标记元素保存原始短语，供提示和还原使用。

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::{
    append_child, create_element, create_text_node, find_elements, format_declarations,
    get_child_node_by_name, get_node_attr, get_node_name, get_parent_node, has_class,
    inherited_text_style, replace_with, text_of,
};
use crate::rewrite::analyzer::PhrasePair;
use crate::rewrite::config::constants;

/// 短语替换器
#[derive(Debug, Clone)]
pub struct PhraseApplier {
    marker_class: String,
}

impl Default for PhraseApplier {
    fn default() -> Self {
        Self::new(constants::MARKER_CLASS)
    }
}

impl PhraseApplier {
    pub fn new(marker_class: impl Into<String>) -> Self {
        Self {
            marker_class: marker_class.into(),
        }
    }

    pub fn marker_class(&self) -> &str {
        &self.marker_class
    }

    /// 在段落中应用短语替换，返回新插入的标记元素
    ///
    /// 较长的短语优先；每个文本节点只应用第一个命中的短语，
    /// 但会替换该短语在节点中的全部出现。已在标记内的文本不再处理。
    pub fn apply_phrases(&self, block: &Handle, pairs: &[PhrasePair]) -> Vec<Handle> {
        let mut sorted: Vec<&PhrasePair> = pairs
            .iter()
            .filter(|pair| !pair.original_phrase.is_empty())
            .collect();
        // 稳定排序，长度相同时保持原有顺序
        sorted.sort_by(|a, b| {
            b.original_phrase
                .chars()
                .count()
                .cmp(&a.original_phrase.chars().count())
        });

        if sorted.is_empty() {
            return Vec::new();
        }

        // 先取快照，替换过程中不会影响遍历
        let text_nodes = self.collect_text_nodes(block);
        let mut markers = Vec::new();

        for node in text_nodes {
            let text = match text_of(&node) {
                Some(text) => text,
                None => continue,
            };

            let pair = match sorted.iter().find(|p| text.contains(p.original_phrase.as_str())) {
                Some(pair) => pair,
                None => continue,
            };

            let parent = match get_parent_node(&node) {
                Some(parent) => parent,
                None => continue,
            };
            let style = format_declarations(&inherited_text_style(&parent));

            let mut replacement_nodes = Vec::new();
            let mut inserted = Vec::new();
            for (i, part) in text.split(pair.original_phrase.as_str()).enumerate() {
                if i > 0 {
                    let marker = self.create_marker(pair, &style);
                    inserted.push(marker.clone());
                    replacement_nodes.push(marker);
                }
                if !part.is_empty() {
                    replacement_nodes.push(create_text_node(part));
                }
            }

            if replace_with(&node, replacement_nodes) {
                tracing::debug!(
                    "替换 '{}' → '{}' ({} 处)",
                    pair.original_phrase,
                    pair.replacement_form,
                    inserted.len()
                );
                markers.extend(inserted);
            }
        }

        markers
    }

    fn create_marker(&self, pair: &PhrasePair, style: &str) -> Handle {
        let mut attributes = vec![
            ("class", self.marker_class.as_str()),
            (constants::ORIGINAL_ATTR, pair.original_phrase.as_str()),
            ("title", pair.original_phrase.as_str()),
        ];
        if !style.is_empty() {
            attributes.push(("style", style));
        }

        let marker = create_element("span", &attributes);
        append_child(&marker, create_text_node(&pair.replacement_form));
        marker
    }

    /// 按文档顺序收集段落下的文本节点，跳过已有标记和不渲染的元素
    fn collect_text_nodes(&self, block: &Handle) -> Vec<Handle> {
        let mut nodes = Vec::new();
        self.collect_text_nodes_into(block, &mut nodes);
        nodes
    }

    fn collect_text_nodes_into(&self, node: &Handle, nodes: &mut Vec<Handle>) {
        for child in node.children.borrow().iter() {
            match child.data {
                NodeData::Text { .. } => nodes.push(child.clone()),
                NodeData::Element { ref name, .. } => {
                    if has_class(child, &self.marker_class)
                        || constants::SKIP_ELEMENTS.contains(&name.local.as_ref())
                    {
                        continue;
                    }
                    self.collect_text_nodes_into(child, nodes);
                }
                _ => {}
            }
        }
    }
}

/// 标记元素使用的样式表
pub fn marker_stylesheet(marker_class: &str) -> String {
    format!(
        ".{class} {{ background: #fff9b1 !important; border-radius: 2px; padding: 0 4px; \
         display: inline; cursor: pointer; font-weight: bold; position: relative; color: #222; }}\n\
         .{class}[title]:hover {{ text-decoration: underline dotted; }}",
        class = marker_class
    )
}

/// 在 `<head>` 中注入一次标记样式表，返回是否新注入
pub fn ensure_marker_styles(document: &Handle, marker_class: &str) -> bool {
    let existing = find_elements(document, &|node| {
        get_node_name(node) == Some("style")
            && get_node_attr(node, "id").as_deref() == Some(constants::STYLE_ELEMENT_ID)
    });
    if !existing.is_empty() {
        return false;
    }

    let head = get_child_node_by_name(document, "html")
        .and_then(|html| get_child_node_by_name(&html, "head"));
    let head = match head {
        Some(head) => head,
        None => return false,
    };

    let style = create_element("style", &[("id", constants::STYLE_ELEMENT_ID)]);
    append_child(&style, create_text_node(&marker_stylesheet(marker_class)));
    append_child(&head, style);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{html_to_dom, serialize_node, text_content};

    fn first(dom: &markup5ever_rcdom::RcDom, tag: &str) -> Handle {
        find_elements(&dom.document, &|n| get_node_name(n) == Some(tag))[0].clone()
    }

    fn pair(original: &str, replacement: &str) -> PhrasePair {
        PhrasePair::new(original, replacement)
    }

    fn html_of(node: &Handle) -> String {
        String::from_utf8(serialize_node(node).unwrap()).unwrap()
    }

    #[test]
    fn test_longest_phrase_wins() {
        let dom = html_to_dom(b"<p>I am very happy today</p>", "utf-8").unwrap();
        let p = first(&dom, "p");

        let markers = PhraseApplier::default().apply_phrases(
            &p,
            &[pair("happy", "ecstatic"), pair("very happy", "ecstatic")],
        );

        assert_eq!(markers.len(), 1);
        assert_eq!(text_content(&p), "I am ecstatic today");
        assert_eq!(
            get_node_attr(&markers[0], constants::ORIGINAL_ATTR).as_deref(),
            Some("very happy")
        );
    }

    #[test]
    fn test_every_occurrence_in_a_node_is_replaced() {
        let dom = html_to_dom(b"<p>happy, happy happy end</p>", "utf-8").unwrap();
        let p = first(&dom, "p");

        let markers = PhraseApplier::default().apply_phrases(&p, &[pair("happy", "glad")]);
        assert_eq!(markers.len(), 3);
        assert_eq!(text_content(&p), "glad, glad glad end");
        // 相邻出现之间不会产生空文本节点
        assert!(p
            .children
            .borrow()
            .iter()
            .all(|c| text_of(c).map(|t| !t.is_empty()).unwrap_or(true)));
    }

    #[test]
    fn test_each_text_node_is_scanned() {
        let dom = html_to_dom(b"<p>so happy <b>and happy</b> indeed</p>", "utf-8").unwrap();
        let p = first(&dom, "p");

        let markers = PhraseApplier::default().apply_phrases(&p, &[pair("happy", "glad")]);
        assert_eq!(markers.len(), 2);
        assert_eq!(text_content(&p), "so glad and glad indeed");
    }

    #[test]
    fn test_only_first_matching_phrase_per_node() {
        let dom = html_to_dom(b"<p>happy and sad</p>", "utf-8").unwrap();
        let p = first(&dom, "p");

        let markers = PhraseApplier::default()
            .apply_phrases(&p, &[pair("happy", "glad"), pair("sad", "blue")]);
        assert_eq!(markers.len(), 1);
        assert_eq!(text_content(&p), "glad and sad");
    }

    #[test]
    fn test_marker_inherits_text_style() {
        let dom = html_to_dom(
            br#"<p style="font-family: Georgia; color: red">so <em style="color: blue">happy</em></p>"#,
            "utf-8",
        )
        .unwrap();
        let p = first(&dom, "p");

        let markers = PhraseApplier::default().apply_phrases(&p, &[pair("happy", "glad")]);
        assert_eq!(
            get_node_attr(&markers[0], "style").as_deref(),
            Some("font-family: Georgia; color: blue;")
        );
        assert!(html_of(&p).contains(r#"class="lexa-replacement""#));
    }

    #[test]
    fn test_existing_markers_are_not_rewritten() {
        let dom = html_to_dom(b"<p>happy</p>", "utf-8").unwrap();
        let p = first(&dom, "p");
        let applier = PhraseApplier::default();

        assert_eq!(applier.apply_phrases(&p, &[pair("happy", "happy joy")]).len(), 1);
        assert_eq!(applier.apply_phrases(&p, &[pair("happy", "glad")]).len(), 0);
        assert_eq!(text_content(&p), "happy joy");
    }

    #[test]
    fn test_styles_injected_once() {
        let dom = html_to_dom(b"<p>text</p>", "utf-8").unwrap();
        assert!(ensure_marker_styles(&dom.document, constants::MARKER_CLASS));
        assert!(!ensure_marker_styles(&dom.document, constants::MARKER_CLASS));

        let head = first(&dom, "head");
        assert!(text_content(&head).contains(".lexa-replacement"));
    }
}
