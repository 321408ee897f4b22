//! 段落收集器模块
//!
//! 按文档顺序收集参与布局、且文本非空的段落级元素

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::{get_node_attr, is_display_none, text_content};
use crate::rewrite::config::constants;

/// 段落标识：底层 DOM 节点的地址
///
/// 只在节点存活期间有意义，处理状态跟踪器会同时保存弱引用防止地址被复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub fn of(node: &Handle) -> Self {
        BlockId(Rc::as_ptr(node) as usize)
    }
}

/// 一个段落及其文本快照
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub id: BlockId,
    pub node: Handle,
    pub text: String,
}

impl TextBlock {
    pub fn new(node: Handle) -> Self {
        let text = text_content(&node);
        Self {
            id: BlockId::of(&node),
            node,
            text,
        }
    }
}

/// 收集器配置
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub block_tags: Vec<String>,
    pub skip_elements: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            block_tags: constants::BLOCK_TAGS.iter().map(|t| t.to_string()).collect(),
            skip_elements: constants::SKIP_ELEMENTS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl CollectorConfig {
    pub fn with_block_tags(block_tags: &[String]) -> Self {
        Self {
            block_tags: block_tags.iter().map(|t| t.to_ascii_lowercase()).collect(),
            ..Self::default()
        }
    }
}

/// 收集统计
#[derive(Debug, Default, Clone)]
pub struct CollectionStats {
    pub nodes_visited: usize,
    pub nodes_skipped: usize,
    pub empty_blocks: usize,
    pub blocks_collected: usize,
}

/// 段落收集器
pub struct BlockCollector {
    config: CollectorConfig,
    stats: CollectionStats,
}

impl BlockCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            stats: CollectionStats::default(),
        }
    }

    /// 收集文档中的段落，每次调用都重新遍历
    pub fn extract_blocks(&mut self, root: &Handle) -> Vec<TextBlock> {
        self.stats = CollectionStats::default();
        let mut blocks = Vec::new();
        self.collect_recursive(root, &mut blocks);
        tracing::debug!(
            "收集到 {} 个段落（访问 {} 个节点，跳过 {} 个）",
            blocks.len(),
            self.stats.nodes_visited,
            self.stats.nodes_skipped
        );
        blocks
    }

    fn collect_recursive(&mut self, node: &Handle, blocks: &mut Vec<TextBlock>) {
        self.stats.nodes_visited += 1;

        if let NodeData::Element { ref name, .. } = node.data {
            let tag_name = name.local.as_ref();

            if !self.is_laid_out(node, tag_name) {
                self.stats.nodes_skipped += 1;
                return;
            }

            if self.config.block_tags.iter().any(|t| t == tag_name) {
                let block = TextBlock::new(node.clone());
                if block.text.trim().is_empty() {
                    self.stats.empty_blocks += 1;
                } else {
                    self.stats.blocks_collected += 1;
                    blocks.push(block);
                    return;
                }
            }
        }

        for child in node.children.borrow().iter() {
            self.collect_recursive(child, blocks);
        }
    }

    /// 静态文档中对“参与布局”的近似判断
    fn is_laid_out(&self, node: &Handle, tag_name: &str) -> bool {
        if self.config.skip_elements.iter().any(|t| t == tag_name) {
            return false;
        }
        if get_node_attr(node, "hidden").is_some() {
            return false;
        }
        !get_node_attr(node, "style")
            .map(|style| is_display_none(&style))
            .unwrap_or(false)
    }

    pub fn get_stats(&self) -> &CollectionStats {
        &self.stats
    }
}

impl Default for BlockCollector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

/// 便利函数：使用默认配置收集段落
pub fn extract_blocks(root: &Handle) -> Vec<TextBlock> {
    BlockCollector::default().extract_blocks(root)
}
