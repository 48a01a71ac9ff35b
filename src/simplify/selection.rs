//! 选区追踪器
//!
//! 观察页面上的活动文本选区，对高频变化去抖，向订阅者发布当前选中
//! 文本；选区丢失时发布显式的"已清除"信号，让下游能区分"什么都没选"
//! 与"选了长度为零的内容"。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::dom::{PageDocument, SelectionRange};
use crate::simplify::rate::now_ms;

/// 选区稳定判定的去抖窗口
pub const SELECTION_DEBOUNCE: Duration = Duration::from_millis(50);

/// 触发下游动作所需的最小选区长度（严格大于）
pub const MIN_SELECTION_CHARS: usize = 3;

/// 选区快照
///
/// 在选区稳定后创建。句柄在任何异步工作开始前克隆，活动选区随后的
/// 变化或清除不影响快照。
#[derive(Clone)]
pub struct SelectionSnapshot {
    /// 选中的原始文本
    pub text: String,
    /// 捕获到的选区（克隆后的句柄）
    pub range: SelectionRange,
    /// 捕获时间（Unix 毫秒）
    pub captured_at_ms: u64,
}

/// 选区事件
#[derive(Clone)]
pub enum SelectionEvent {
    /// 出现长度达标的稳定选区
    Selected(SelectionSnapshot),
    /// 选区被清除或过短
    Cleared,
}

/// 选区来源
///
/// 回退顺序固定：先查富文本文档选区，再查聚焦的可编辑字段（input/
/// textarea 暴露独立的选区接口，需要单独合成）。
pub trait SelectionSource {
    /// 富文本文档选区
    fn document_selection(&self) -> Option<SelectionRange>;
    /// 聚焦可编辑字段内的选区
    fn editable_selection(&self) -> Option<SelectionRange>;
}

impl SelectionSource for PageDocument {
    fn document_selection(&self) -> Option<SelectionRange> {
        self.selection()
    }

    fn editable_selection(&self) -> Option<SelectionRange> {
        self.editable()
    }
}

/// 从来源立即捕获一份快照
///
/// 文本按原样保留（替换与撤销以它为准），长度阈值按去除首尾空白后的
/// 字符数判定。
pub fn capture_snapshot(source: &dyn SelectionSource) -> Option<SelectionSnapshot> {
    let range = source
        .document_selection()
        .filter(|r| r.text().map(|t| !t.trim().is_empty()).unwrap_or(false))
        .or_else(|| source.editable_selection())?;

    let text = range.text()?;
    if text.trim().chars().count() <= MIN_SELECTION_CHARS {
        return None;
    }

    Some(SelectionSnapshot {
        text,
        range,
        captured_at_ms: now_ms(),
    })
}

type Listener = Box<dyn Fn(&SelectionEvent)>;

/// 选区追踪器
///
/// 单文档上下文内使用；去抖任务通过 `spawn_local` 调度，需要运行在
/// `tokio::task::LocalSet` 中。不修改文档，唯一副作用是回调。
pub struct SelectionTracker {
    source: Rc<dyn SelectionSource>,
    debounce: Duration,
    generation: Rc<Cell<u64>>,
    listeners: Rc<RefCell<Vec<Listener>>>,
    last: Rc<RefCell<Option<SelectionSnapshot>>>,
}

impl SelectionTracker {
    /// 创建新的选区追踪器
    pub fn new(source: Rc<dyn SelectionSource>) -> Self {
        Self {
            source,
            debounce: SELECTION_DEBOUNCE,
            generation: Rc::new(Cell::new(0)),
            listeners: Rc::new(RefCell::new(Vec::new())),
            last: Rc::new(RefCell::new(None)),
        }
    }

    /// 覆盖去抖窗口（测试用）
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// 订阅选区事件
    pub fn on_change(&self, listener: impl Fn(&SelectionEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// 底层选区变化时调用（selection-change、pointer-up 的等价物）
    ///
    /// 去抖窗口内的连续调用只触发最后一次发布。
    pub fn notify_change(&self) {
        let generation = self.generation.clone();
        generation.set(generation.get() + 1);
        let expected = generation.get();

        let source = self.source.clone();
        let listeners = self.listeners.clone();
        let last = self.last.clone();
        let debounce = self.debounce;

        tokio::task::spawn_local(async move {
            tokio::time::sleep(debounce).await;
            // 窗口内又有新变化，本次发布作废
            if generation.get() != expected {
                return;
            }

            let event = match capture_snapshot(source.as_ref()) {
                Some(snapshot) => {
                    *last.borrow_mut() = Some(snapshot.clone());
                    SelectionEvent::Selected(snapshot)
                }
                None => {
                    *last.borrow_mut() = None;
                    SelectionEvent::Cleared
                }
            };

            for listener in listeners.borrow().iter() {
                listener(&event);
            }
        });
    }

    /// 立即捕获当前选区（热键路径，不经过去抖）
    pub fn capture_now(&self) -> Option<SelectionSnapshot> {
        capture_snapshot(self.source.as_ref())
    }

    /// 最近一次去抖发布的快照
    pub fn last_snapshot(&self) -> Option<SelectionSnapshot> {
        self.last.borrow().clone()
    }

    /// 页面隐藏/卸载时调用：作废未决的去抖任务并移除全部订阅
    pub fn shutdown(&self) {
        self.generation.set(self.generation.get() + 1);
        self.listeners.borrow_mut().clear();
        *self.last.borrow_mut() = None;
    }
}
