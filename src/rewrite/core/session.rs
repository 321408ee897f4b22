//! 页面会话
//!
//! 每个已加载页面对应一个会话：持有页面 DOM、页面生命周期内已处理段落的集合、
//! 以及待登记可见性的新标记。页面导航或关闭时会话被一次性失效，
//! 之后所有经由会话的 DOM 访问都返回 `ContextInvalidated`。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, RcDom};
use url::Url;

use crate::parsers::html::{append_child, get_child_node_by_name, html_to_dom, serialize_document};
use crate::rewrite::analyzer::PhrasePair;
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::pipeline::applier::{ensure_marker_styles, PhraseApplier};
use crate::rewrite::pipeline::collector::{BlockCollector, BlockId, TextBlock};
use crate::rewrite::pipeline::revert;

/// 单个页面的会话状态
pub struct PageSession {
    tab_id: String,
    url: Option<Url>,
    dom: RcDom,
    alive: Cell<bool>,
    /// 已处理段落；保存弱引用，防止节点释放后地址被复用造成误判
    processed: RefCell<HashMap<BlockId, Weak<Node>>>,
    pending_markers: RefCell<Vec<Handle>>,
}

impl PageSession {
    pub fn new(tab_id: impl Into<String>, dom: RcDom, url: Option<Url>) -> Self {
        Self {
            tab_id: tab_id.into(),
            url,
            dom,
            alive: Cell::new(true),
            processed: RefCell::new(HashMap::new()),
            pending_markers: RefCell::new(Vec::new()),
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// 使会话失效，之后的 DOM 访问全部失败
    pub fn invalidate(&self) {
        if self.alive.replace(false) {
            tracing::debug!("页面会话已失效: {}", self.tab_id);
        }
    }

    pub fn ensure_alive(&self) -> RewriteResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(RewriteError::ContextInvalidated(format!("标签页 {}", self.tab_id)))
        }
    }

    /// 文档根节点
    pub fn document(&self) -> RewriteResult<&Handle> {
        self.ensure_alive()?;
        Ok(&self.dom.document)
    }

    /// 重新收集页面段落
    pub fn extract_blocks(&self, collector: &mut BlockCollector) -> RewriteResult<Vec<TextBlock>> {
        Ok(collector.extract_blocks(self.document()?))
    }

    /// 向 `<body>` 末尾追加一段 HTML，返回追加的顶层节点数
    ///
    /// 模拟页面运行期间动态插入的内容（无限滚动、单页应用路由等）。
    pub fn append_content(&self, html: &str) -> RewriteResult<usize> {
        let body = body_of(self.document()?)
            .ok_or_else(|| RewriteError::InvalidInput("页面没有 body 元素".to_string()))?;

        let fragment = html_to_dom(html.as_bytes(), "utf-8")?;
        let nodes: Vec<Handle> = match body_of(&fragment.document) {
            Some(fragment_body) => fragment_body.children.borrow_mut().drain(..).collect(),
            None => Vec::new(),
        };

        let count = nodes.len();
        for node in nodes {
            append_child(&body, node);
        }
        Ok(count)
    }

    /// 段落是否已在本页面生命周期内处理过
    pub fn is_processed(&self, block: &TextBlock) -> bool {
        self.processed
            .borrow()
            .get(&block.id)
            .and_then(Weak::upgrade)
            .map(|node| Rc::ptr_eq(&node, &block.node))
            .unwrap_or(false)
    }

    pub fn mark_processed(&self, block: &TextBlock) -> RewriteResult<()> {
        self.ensure_alive()?;
        self.processed
            .borrow_mut()
            .insert(block.id, Rc::downgrade(&block.node));
        Ok(())
    }

    pub fn processed_count(&self) -> usize {
        self.processed
            .borrow()
            .values()
            .filter(|node| node.strong_count() > 0)
            .count()
    }

    pub fn clear_processed(&self) {
        self.processed.borrow_mut().clear();
    }

    /// 在段落中应用替换，返回插入的标记数量
    pub fn apply_phrases(
        &self,
        applier: &PhraseApplier,
        block: &TextBlock,
        pairs: &[PhrasePair],
    ) -> RewriteResult<usize> {
        self.ensure_alive()?;
        let markers = applier.apply_phrases(&block.node, pairs);
        let count = markers.len();
        self.pending_markers.borrow_mut().extend(markers);
        Ok(count)
    }

    /// 注入标记样式表（只注入一次）
    pub fn ensure_marker_styles(&self, marker_class: &str) -> RewriteResult<bool> {
        Ok(ensure_marker_styles(self.document()?, marker_class))
    }

    /// 尚未被取走的新标记数量
    pub fn pending_marker_count(&self) -> usize {
        self.pending_markers.borrow().len()
    }

    /// 取出新插入、尚未登记可见性跟踪的标记
    ///
    /// 标记一直保留到调用方取走为止，多次处理累积在同一列表中。
    pub fn take_pending_markers(&self) -> Vec<Handle> {
        std::mem::take(&mut *self.pending_markers.borrow_mut())
    }

    /// 还原所有标记并清空已处理集合
    pub fn revert(&self, marker_class: &str) -> RewriteResult<usize> {
        let reverted = revert::revert(self.document()?, marker_class);
        self.clear_processed();
        self.pending_markers.borrow_mut().clear();
        Ok(reverted)
    }

    /// 序列化当前文档
    pub fn serialize(&self, encoding: &str) -> RewriteResult<Vec<u8>> {
        self.ensure_alive()?;
        Ok(serialize_document(&self.dom, encoding)?)
    }
}

fn body_of(document: &Handle) -> Option<Handle> {
    get_child_node_by_name(document, "html").and_then(|html| get_child_node_by_name(&html, "body"))
}
