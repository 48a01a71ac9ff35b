//! 文档模型模块
//!
//! 提供基于 rcdom 的内存文档模型，是简化管线操作的宿主环境：
//!
//! - **节点工具**：属性读写、父节点访问、文本收集
//! - **选区模型**：`SelectionRange` 描述文本节点内的一段选中内容
//! - **页面文档**：`PageDocument` 聚合 DOM、当前选区和可编辑字段状态

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::interface::{Attribute, QualName};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, parse_document, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字符串解析为 DOM
pub fn html_to_dom(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .unwrap()
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

/// 设置节点属性；`attr_value` 为 `None` 时移除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();

        if let Some(existing) = attrs_mut
            .iter_mut()
            .find(|attr| &*attr.name.local == attr_name)
        {
            match attr_value {
                Some(value) => {
                    existing.value.clear();
                    existing.value.push_slice(&value);
                }
                None => {
                    attrs_mut.retain(|attr| &*attr.name.local != attr_name);
                }
            }
        } else if let Some(value) = attr_value {
            attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: StrTendril::from(value.as_str()),
            });
        }
    }
}

/// 获取父节点（弱引用升级；节点已脱离文档时返回 `None`）
pub fn parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    child.parent.set(weak);
    parent
}

/// 判断节点是否仍挂载在文档树上
///
/// 沿父链向上爬升，最顶端必须是 Document 节点。被页面其他逻辑摘除的
/// 节点会在中途断链。
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if matches!(current.data, NodeData::Document) {
            return true;
        }
        match parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 判断 `node` 是否为 `ancestor` 的后代（含自身）
pub fn is_descendant_of(node: &Handle, ancestor: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if Rc::ptr_eq(&current, ancestor) {
            return true;
        }
        match parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 创建指定标签的空元素节点
pub fn create_element(name: &str) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(name)),
        attrs: RefCell::new(Vec::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// 读取文本节点内容；非文本节点返回 `None`
pub fn text_node_content(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆写文本节点内容
pub fn set_text_node_content(node: &Handle, text: &str) -> bool {
    match &node.data {
        NodeData::Text { contents } => {
            let mut contents = contents.borrow_mut();
            contents.clear();
            contents.push_slice(text);
            true
        }
        _ => false,
    }
}

/// 收集节点及其后代的全部文本内容
pub fn collect_text(node: &Handle) -> String {
    let mut out = String::new();
    collect_text_into(node, &mut out);
    out
}

fn collect_text_into(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text_into(child, out);
    }
}

/// 按标签名递归查找元素
pub fn find_elements(node: &Handle, element_name: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    if let NodeData::Element { name, .. } = &node.data {
        if &*name.local == element_name {
            found.push(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        found.append(&mut find_elements(child, element_name));
    }
    found
}

/// 在父节点的子列表中定位节点位置
pub fn child_index(parent: &Handle, child: &Handle) -> Option<usize> {
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, child))
}

/// 在 `parent` 的第 `index` 个位置插入子节点
pub fn insert_child_at(parent: &Handle, index: usize, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().insert(index, child);
}

/// 文本节点内的一段选区
///
/// `start` 与 `end` 为节点文本内的字节偏移。句柄以 `Rc` 共享，克隆选区
/// 只复制引用，被克隆的选区不受后续活动选区变化影响。
#[derive(Clone)]
pub struct SelectionRange {
    /// 承载选区的文本节点
    pub node: Handle,
    /// 起始字节偏移
    pub start: usize,
    /// 结束字节偏移（不含）
    pub end: usize,
}

impl SelectionRange {
    /// 创建覆盖整个文本节点的选区
    pub fn whole_node(node: Handle) -> Option<Self> {
        let len = text_node_content(&node)?.len();
        Some(Self {
            node,
            start: 0,
            end: len,
        })
    }

    /// 提取选中的文本；偏移非法（越界或落在字符中间）时返回 `None`
    pub fn text(&self) -> Option<String> {
        let content = text_node_content(&self.node)?;
        content.get(self.start..self.end).map(str::to_string)
    }

    /// 判断选区是否与给定节点相交
    ///
    /// 相交定义为：同一节点、对方是选区节点的祖先、或对方在选区节点的
    /// 子树内。栈深度受页面实际使用量限制，线性判断足够。
    pub fn intersects_node(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.node, other)
            || is_descendant_of(&self.node, other)
            || is_descendant_of(other, &self.node)
    }
}

/// 页面文档
///
/// 聚合 DOM 树与当前的选择状态。富文本选区和可编辑字段（input/textarea
/// 的等价物）分开记录，后者在富文本选区缺失时作为回退来源。
pub struct PageDocument {
    dom: RcDom,
    selection: RefCell<Option<SelectionRange>>,
    focused_editable: RefCell<Option<SelectionRange>>,
}

impl PageDocument {
    /// 从 HTML 字符串构建页面文档
    pub fn from_html(html: &str) -> Self {
        Self {
            dom: html_to_dom(html),
            selection: RefCell::new(None),
            focused_editable: RefCell::new(None),
        }
    }

    /// 文档根节点
    pub fn document(&self) -> Handle {
        self.dom.document.clone()
    }

    /// 设置富文本选区
    pub fn select(&self, node: Handle, start: usize, end: usize) {
        *self.selection.borrow_mut() = Some(SelectionRange { node, start, end });
    }

    /// 清除富文本选区
    pub fn clear_selection(&self) {
        *self.selection.borrow_mut() = None;
    }

    /// 当前富文本选区
    pub fn selection(&self) -> Option<SelectionRange> {
        self.selection.borrow().clone()
    }

    /// 聚焦可编辑字段并记录其内部选区
    pub fn focus_editable(&self, node: Handle, start: usize, end: usize) {
        *self.focused_editable.borrow_mut() = Some(SelectionRange { node, start, end });
    }

    /// 失焦可编辑字段
    pub fn blur_editable(&self) {
        *self.focused_editable.borrow_mut() = None;
    }

    /// 当前可编辑字段选区
    pub fn editable(&self) -> Option<SelectionRange> {
        self.focused_editable.borrow().clone()
    }

    /// 文档全文（调试与测试用）
    pub fn full_text(&self) -> String {
        collect_text(&self.dom.document)
    }
}
