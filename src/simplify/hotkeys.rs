//! 热键路由
//!
//! 把按键事件映射为编排器动作：简化键走"立即捕获选区、触发简化"的
//! 快路径，Escape 键回退最近一次简化。未消费的按键交还宿主继续分发。

use std::rc::Rc;

use crate::simplify::error::SimplifyError;
use crate::simplify::orchestrator::{SimplifyOrchestrator, TriggerOutcome};
use crate::simplify::selection::SelectionTracker;

/// 已绑定的热键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// 简化当前选区
    Simplify,
    /// 回退最近一次简化
    Escape,
}

/// 按键处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// 本层已消费，宿主不应继续分发
    Consumed,
    /// 本层无事可做，按键交还宿主
    Ignored,
}

/// 热键路由器
///
/// 与编排器同驻单线程上下文。
pub struct HotkeyRouter {
    orchestrator: Rc<SimplifyOrchestrator>,
    tracker: Rc<SelectionTracker>,
}

impl HotkeyRouter {
    /// 创建热键路由器
    pub fn new(orchestrator: Rc<SimplifyOrchestrator>, tracker: Rc<SelectionTracker>) -> Self {
        Self {
            orchestrator,
            tracker,
        }
    }

    /// 处理一次按键
    ///
    /// 简化键绕过去抖直接捕获当前选区；无选区时静默交还按键，宿主
    /// 保留默认绑定。Escape 仅在实际发生回退时上报消费，否则保持
    /// 页面原有的 Escape 语义。
    pub async fn handle(&self, key: Key) -> KeyOutcome {
        match key {
            Key::Simplify => {
                let snapshot = self.tracker.capture_now();
                match self.orchestrator.trigger(snapshot).await {
                    TriggerOutcome::Completed => KeyOutcome::Consumed,
                    // 无选区的按键不归本层
                    TriggerOutcome::Rejected(SimplifyError::NoSelection) => KeyOutcome::Ignored,
                    TriggerOutcome::Rejected(_) => KeyOutcome::Consumed,
                    TriggerOutcome::Ignored => KeyOutcome::Ignored,
                }
            }
            Key::Escape => {
                if self.orchestrator.undo_last() {
                    KeyOutcome::Consumed
                } else {
                    KeyOutcome::Ignored
                }
            }
        }
    }
}
