//! 共享状态存储
//!
//! 编排器与展示层之间的状态通过注入的存储接口流动，绝不依赖环境
//! 全局量；事件以带标签负载的类型化变体发布，而非临时回调扇出。
//! 测试注入内存假实现即可获得确定性。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::simplify::error::SimplifyError;

/// 用户可见错误未被手动关闭时的自动消散时限
pub const ERROR_DISMISS_AFTER: Duration = Duration::from_secs(5);

/// 浮出给展示层的错误
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacedError {
    /// 错误本体
    pub error: SimplifyError,
    /// 简短的用户可读文案
    pub message: String,
    /// 浮出时间（Unix 毫秒），自动消散按它判定代际
    pub raised_at_ms: u64,
}

/// 单文档上下文的会话状态
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// 用户当前选中待简化的文本
    pub selected_text: String,
    /// 选中时间（Unix 毫秒）
    pub selected_at_ms: Option<u64>,
    /// 是否有简化请求在处理中（展示层据此渲染加载态）
    pub is_loading: bool,
    /// 已完成的简化次数
    pub simplify_count: u32,
    /// 最近一次简化完成时间（Unix 毫秒）
    pub last_simplified_at_ms: Option<u64>,
    /// 当前浮出的错误
    pub last_error: Option<SurfacedError>,
}

/// 状态变更事件
#[derive(Debug, Clone)]
pub enum StateChange {
    /// 出现稳定选区
    TextSelected { text: String, at_ms: u64 },
    /// 选区被清除
    SelectionCleared,
    /// 加载标志翻转
    LoadingChanged(bool),
    /// 一次简化成功收尾
    SimplifyComplete { at_ms: u64 },
    /// 一次简化失败
    SimplifyFailed {
        error: SimplifyError,
        raised_at_ms: u64,
    },
    /// 错误被关闭（手动或自动消散）
    ErrorDismissed,
}

/// 状态存储接口
pub trait StateStore: Send + Sync {
    /// 读取当前状态快照
    fn snapshot(&self) -> SessionState;
    /// 应用一次状态变更并向订阅者广播
    fn apply(&self, change: StateChange);
    /// 订阅状态变更事件
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
}

/// 内存状态存储（参考实现）
pub struct MemoryStore {
    state: Mutex<SessionState>,
    tx: broadcast::Sender<StateChange>,
}

impl MemoryStore {
    /// 创建初始状态为默认值的存储
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(SessionState::default()),
            tx,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn snapshot(&self) -> SessionState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn apply(&self, change: StateChange) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &change {
                StateChange::TextSelected { text, at_ms } => {
                    state.selected_text = text.clone();
                    state.selected_at_ms = Some(*at_ms);
                    state.is_loading = false;
                }
                StateChange::SelectionCleared => {
                    state.selected_text.clear();
                    state.selected_at_ms = None;
                    state.is_loading = false;
                }
                StateChange::LoadingChanged(loading) => {
                    state.is_loading = *loading;
                }
                StateChange::SimplifyComplete { at_ms } => {
                    state.is_loading = false;
                    state.simplify_count += 1;
                    state.last_simplified_at_ms = Some(*at_ms);
                    state.last_error = None;
                }
                StateChange::SimplifyFailed {
                    error,
                    raised_at_ms,
                } => {
                    state.is_loading = false;
                    state.last_error = Some(SurfacedError {
                        message: error.to_string(),
                        error: error.clone(),
                        raised_at_ms: *raised_at_ms,
                    });
                }
                StateChange::ErrorDismissed => {
                    state.last_error = None;
                }
            }
        }

        // 没有订阅者时发送会失败，忽略即可
        let _ = self.tx.send(change);
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }
}

/// 调度错误自动消散
///
/// 到期后仅当浮出的仍是同一代错误时才关闭，手动关闭或新错误覆盖都会
/// 使本次调度失效。
pub fn schedule_error_dismiss(store: Arc<dyn StateStore>, raised_at_ms: u64, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let still_current = store
            .snapshot()
            .last_error
            .map(|e| e.raised_at_ms == raised_at_ms)
            .unwrap_or(false);
        if still_current {
            store.apply(StateChange::ErrorDismissed);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_mutates_snapshot_and_broadcasts() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.apply(StateChange::TextSelected {
            text: "hello world".to_string(),
            at_ms: 42,
        });
        store.apply(StateChange::LoadingChanged(true));

        let state = store.snapshot();
        assert_eq!(state.selected_text, "hello world");
        assert_eq!(state.selected_at_ms, Some(42));
        assert!(state.is_loading);

        assert!(matches!(
            rx.try_recv(),
            Ok(StateChange::TextSelected { .. })
        ));
        assert!(matches!(rx.try_recv(), Ok(StateChange::LoadingChanged(true))));
    }

    #[test]
    fn completion_resets_loading_and_clears_error() {
        let store = MemoryStore::new();
        store.apply(StateChange::LoadingChanged(true));
        store.apply(StateChange::SimplifyFailed {
            error: SimplifyError::Timeout,
            raised_at_ms: 1,
        });
        assert!(store.snapshot().last_error.is_some());

        store.apply(StateChange::SimplifyComplete { at_ms: 2 });
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.simplify_count, 1);
        assert_eq!(state.last_simplified_at_ms, Some(2));
        assert!(state.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_only_fires_for_the_same_error_generation() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        store.apply(StateChange::SimplifyFailed {
            error: SimplifyError::Timeout,
            raised_at_ms: 10,
        });
        schedule_error_dismiss(store.clone(), 10, ERROR_DISMISS_AFTER);

        // 到期前出现新一代错误，旧调度作废
        tokio::time::sleep(Duration::from_secs(3)).await;
        store.apply(StateChange::SimplifyFailed {
            error: SimplifyError::Timeout,
            raised_at_ms: 20,
        });
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(
            store.snapshot().last_error.is_some(),
            "the newer error must survive the stale dismissal"
        );

        schedule_error_dismiss(store.clone(), 20, ERROR_DISMISS_AFTER);
        tokio::time::sleep(ERROR_DISMISS_AFTER + Duration::from_millis(1)).await;
        assert!(store.snapshot().last_error.is_none());
    }
}
