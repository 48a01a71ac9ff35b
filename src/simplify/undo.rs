//! 撤销栈
//!
//! 内存中的 LIFO 记录，支持对最近一次（或多次）简化变更的精确回退。
//! 每个文档生命周期一个栈，纯内存——导航时随文档一起销毁，不做任何
//! 持久化；`clear()` 仅为确定性测试而存在。

use markup5ever_rcdom::Handle;

use crate::dom::{is_attached, set_text_node_content, SelectionRange};

/// 一次可撤销的简化操作
///
/// `node` 是对文档内活动文本节点的回指，不拥有其生命周期——文档拥有
/// 节点，撤销栈只负责查找。
pub struct UndoEntry {
    /// 简化前存在于文档中的文本
    pub original_text: String,
    /// 替换它的简化文本
    pub simplified_text: String,
    /// 流式写入期间被变更的活动文本节点
    pub node: Handle,
}

/// 简化操作的 LIFO 栈
#[derive(Default)]
pub struct UndoStack {
    stack: Vec<UndoEntry>,
}

impl UndoStack {
    /// 创建空栈
    pub fn new() -> Self {
        Self::default()
    }

    /// 压入一条新记录；每次文本节点替换完成后立即调用
    pub fn push(&mut self, entry: UndoEntry) {
        self.stack.push(entry);
    }

    /// 弹出最近一条记录
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.stack.pop()
    }

    /// 查看最近一条记录但不移除
    pub fn peek(&self) -> Option<&UndoEntry> {
        self.stack.last()
    }

    /// 栈是否为空
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// 清空全部记录，不回退任何文档变更
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// 回退最近一次简化：把原文直接写回活动文本节点
    ///
    /// 句柄保持活跃，回退为 O(1)，无需重建选区。空栈时返回 `false`
    /// 且无副作用，调用方（热键处理器）无需前置检查。节点已被页面
    /// 其他逻辑摘除时同样返回 `false`，丢弃该记录。
    pub fn revert_last(&mut self) -> bool {
        let entry = match self.pop() {
            Some(entry) => entry,
            None => return false,
        };

        if !is_attached(&entry.node) {
            tracing::debug!("撤销目标节点已脱离文档，丢弃该记录");
            return false;
        }

        set_text_node_content(&entry.node, &entry.original_text)
    }

    /// 判断给定选区是否与栈上任一活动节点相交
    ///
    /// 供"降级入口"功能使用：用户再次选中已简化文本时改换按钮标签。
    /// 线性扫描，栈深受单页实际使用量限制。
    pub fn selection_overlaps(&self, range: &SelectionRange) -> bool {
        self.stack
            .iter()
            .any(|entry| range.intersects_node(&entry.node))
    }
}
