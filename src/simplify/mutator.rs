//! 文档变更器
//!
//! 给定捕获的选区与文本增量流，就地替换选区内容并在结束时包上可发现
//! 的标记。增量以"累计全文"为载荷，按接收顺序应用即幂等。

use std::cell::RefCell;

use markup5ever_rcdom::Handle;

use crate::dom::{
    child_index, create_element, create_text_node, insert_child_at, parent_node, set_node_attr,
    set_text_node_content, text_node_content, SelectionRange,
};
use crate::simplify::error::{SimplifyError, SimplifyResult};

/// 简化产物的标记属性
///
/// 标记元素对后续 DOM 遍历惰性，仅携带该属性，供"再次选中已简化文本
/// 时提供降级入口"使用。
pub const SIMPLIFIED_MARKER_ATTR: &str = "data-twelvify-simplified";

/// 视口锚点
///
/// 内容长度变化会扰动滚动位置；变更前保存、变更后恢复。无头环境下
/// 使用默认的空实现，嵌入方的展示层提供真实锚点。
pub trait ViewportAnchor {
    /// 变更前保存视口位置
    fn save(&mut self);
    /// 变更后恢复视口位置
    fn restore(&mut self);
}

/// 空锚点（无头环境默认）
#[derive(Debug, Default)]
pub struct NoopAnchor;

impl ViewportAnchor for NoopAnchor {
    fn save(&mut self) {}
    fn restore(&mut self) {}
}

/// 替换过程中的活动文本占位节点句柄（独占）
pub struct LiveText {
    node: Handle,
}

impl LiveText {
    /// 底层文本节点
    pub fn node(&self) -> &Handle {
        &self.node
    }

    /// 当前已写入的文本
    pub fn text(&self) -> String {
        text_node_content(&self.node).unwrap_or_default()
    }
}

/// 文档变更器
pub struct DomMutator {
    anchor: RefCell<Box<dyn ViewportAnchor>>,
}

impl DomMutator {
    /// 创建使用空视口锚点的变更器
    pub fn new() -> Self {
        Self {
            anchor: RefCell::new(Box::new(NoopAnchor)),
        }
    }

    /// 注入真实视口锚点
    pub fn with_anchor(anchor: Box<dyn ViewportAnchor>) -> Self {
        Self {
            anchor: RefCell::new(anchor),
        }
    }

    /// 删除选区内容并在原位置插入空的可变文本占位
    ///
    /// 选区所在的文本节点被切为 前缀 / 占位 / 后缀 三段，返回占位的
    /// 独占句柄。这是管线中第一处文档变更。
    pub fn begin_replacement(&self, range: &SelectionRange) -> SimplifyResult<LiveText> {
        let content = text_node_content(&range.node).ok_or_else(|| SimplifyError::Unknown {
            message: "selection does not cover a text node".to_string(),
        })?;

        let (prefix, suffix) = match (content.get(..range.start), content.get(range.end..)) {
            (Some(prefix), Some(suffix)) if range.start <= range.end => {
                (prefix.to_string(), suffix.to_string())
            }
            _ => {
                return Err(SimplifyError::Unknown {
                    message: "selection offsets are not valid boundaries".to_string(),
                })
            }
        };

        let parent = parent_node(&range.node).ok_or_else(|| SimplifyError::Unknown {
            message: "selected node is detached from the document".to_string(),
        })?;
        let index = child_index(&parent, &range.node).ok_or_else(|| SimplifyError::Unknown {
            message: "selected node is missing from its parent".to_string(),
        })?;

        self.anchor.borrow_mut().save();

        set_text_node_content(&range.node, &prefix);
        let placeholder = create_text_node("");
        insert_child_at(&parent, index + 1, placeholder.clone());
        if !suffix.is_empty() {
            insert_child_at(&parent, index + 2, create_text_node(&suffix));
        }

        self.anchor.borrow_mut().restore();

        Ok(LiveText { node: placeholder })
    }

    /// 将占位内容覆写为迄今累计的全文
    ///
    /// 载荷是累计快照而非追加片段，重复应用同一快照不改变结果。
    pub fn apply_increment(&self, live: &LiveText, snapshot_text: &str) -> SimplifyResult<()> {
        if !set_text_node_content(&live.node, snapshot_text) {
            return Err(SimplifyError::Unknown {
                message: "live placeholder is not a text node".to_string(),
            });
        }
        self.anchor.borrow_mut().restore();
        Ok(())
    }

    /// 将占位包进标记元素，返回标记句柄
    pub fn finalize(&self, live: &LiveText) -> SimplifyResult<Handle> {
        let parent = parent_node(&live.node).ok_or_else(|| SimplifyError::Unknown {
            message: "live placeholder is detached from the document".to_string(),
        })?;
        let index = child_index(&parent, &live.node).ok_or_else(|| SimplifyError::Unknown {
            message: "live placeholder is missing from its parent".to_string(),
        })?;

        let marker = create_element("span");
        set_node_attr(&marker, SIMPLIFIED_MARKER_ATTR, Some("true".to_string()));

        {
            let mut children = parent.children.borrow_mut();
            children[index] = marker.clone();
        }
        marker.parent.set(Some(std::rc::Rc::downgrade(&parent)));
        live.node.parent.set(Some(std::rc::Rc::downgrade(&marker)));
        marker.children.borrow_mut().push(live.node.clone());

        self.anchor.borrow_mut().restore();

        Ok(marker)
    }
}

impl Default for DomMutator {
    fn default() -> Self {
        Self::new()
    }
}
