//! 还原模块

use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::html::{
    create_text_node, find_elements, get_node_attr, get_parent_node, has_class,
    normalize_text_nodes, replace_with, text_content,
};
use crate::rewrite::config::constants;

/// 把文档中所有替换标记还原为原始短语，返回还原数量
///
/// 缺少原始短语属性的标记按其当前文本还原。还原后合并受影响父节点中相邻的文本节点。
pub fn revert(document: &Handle, marker_class: &str) -> usize {
    let markers = find_elements(document, &|node| has_class(node, marker_class));
    let mut parents: Vec<Handle> = Vec::new();
    let mut reverted = 0;

    for marker in markers {
        let original = get_node_attr(&marker, constants::ORIGINAL_ATTR)
            .unwrap_or_else(|| text_content(&marker));

        let parent = match get_parent_node(&marker) {
            Some(parent) => parent,
            None => continue,
        };

        if replace_with(&marker, vec![create_text_node(&original)]) {
            reverted += 1;
            if !parents.iter().any(|p| Rc::ptr_eq(p, &parent)) {
                parents.push(parent);
            }
        }
    }

    for parent in &parents {
        normalize_text_nodes(parent);
    }

    if reverted > 0 {
        tracing::debug!("还原了 {} 个替换标记", reverted);
    }
    reverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{get_node_name, html_to_dom, is_text_node};
    use crate::rewrite::analyzer::PhrasePair;
    use crate::rewrite::pipeline::applier::PhraseApplier;

    #[test]
    fn test_round_trip_restores_text_and_structure() {
        let dom = html_to_dom(b"<p>I am very happy, so happy today</p>", "utf-8").unwrap();
        let p = find_elements(&dom.document, &|n| get_node_name(n) == Some("p"))[0].clone();
        let before = text_content(&p);

        let applier = PhraseApplier::default();
        let markers = applier.apply_phrases(&p, &[PhrasePair::new("happy", "ecstatic")]);
        assert_eq!(markers.len(), 2);
        assert_ne!(text_content(&p), before);

        assert_eq!(revert(&dom.document, applier.marker_class()), 2);
        assert_eq!(text_content(&p), before);
        // 相邻文本节点已合并
        let children = p.children.borrow();
        assert_eq!(children.len(), 1);
        assert!(is_text_node(&children[0]));
    }

    #[test]
    fn test_marker_without_attribute_keeps_its_text() {
        let dom = html_to_dom(
            br#"<p>a <span class="lexa-replacement">b</span> c</p>"#,
            "utf-8",
        )
        .unwrap();
        assert_eq!(revert(&dom.document, constants::MARKER_CLASS), 1);

        let p = find_elements(&dom.document, &|n| get_node_name(n) == Some("p"))[0].clone();
        assert_eq!(text_content(&p), "a b c");
        assert_eq!(p.children.borrow().len(), 1);
    }

    #[test]
    fn test_nothing_to_revert() {
        let dom = html_to_dom(b"<p>plain</p>", "utf-8").unwrap();
        assert_eq!(revert(&dom.document, constants::MARKER_CLASS), 0);
    }
}
