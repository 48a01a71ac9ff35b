//! 简化管线模块
//!
//! 提供完整的"选中即简化"功能，采用清晰的模块化架构：
//! - **selection**: 选区追踪与快照捕获
//! - **stream**: 流式简化客户端与事件解码
//! - **mutator**: 就地文档变更与标记
//! - **undo**: 撤销栈
//! - **orchestrator**: 主状态机
//! - **store**: 共享会话状态
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use twelvify::dom::PageDocument;
//! use twelvify::simplify::{
//!     HttpSimplifier, MemoryStore, SelectionTracker, SimplifyOrchestrator,
//! };
//!
//! # async fn example() {
//! let page = Rc::new(PageDocument::from_html("<p>Some dense prose.</p>"));
//! let tracker = SelectionTracker::new(page.clone());
//! let orchestrator = SimplifyOrchestrator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpSimplifier::new("http://localhost:3000/api/simplify")),
//! );
//!
//! let outcome = orchestrator.trigger(tracker.capture_now()).await;
//! # let _ = outcome;
//! # }
//! ```

/// 错误处理模块 - 统一的错误类型和处理机制
///
/// 覆盖从本地校验到流式传输的全部失败路径
pub mod error;

/// 热键路由模块 - 按键到编排器动作的映射
pub mod hotkeys;

/// 文档变更模块 - 选区替换、增量写入与完成标记
pub mod mutator;

/// 简化选项模块 - 语气、粒度、行业与请求载荷
pub mod options;

/// 编排器模块 - 串联全部组件的主状态机
pub mod orchestrator;

/// 速率闸门模块 - 客户端与服务端共用的滑动窗口判定
pub mod rate;

/// 选区追踪模块 - 去抖、阈值与快照捕获
pub mod selection;

/// 事件协议模块 - 增量事件的编解码与行缓冲
pub mod sse;

/// 共享状态模块 - 会话状态存储与变更广播
pub mod store;

/// 流式客户端模块 - 请求打开、事件解码与超时
pub mod stream;

/// 撤销栈模块 - 最近简化的精确回退
pub mod undo;

/// 错误处理相关类型
///
/// - `SimplifyError`: 简化错误的统一类型
/// - `SimplifyResult<T>`: 简化操作的结果类型
pub use error::{SimplifyError, SimplifyResult};

/// 简化选项与请求载荷
///
/// - `Tone` / `Depth`: 语气与粒度档位
/// - `SimplifyOptions`: 一次简化的选项组合
/// - `SimplifyRequest`: 发往代理服务的请求载荷
pub use options::{Depth, SimplifyOptions, SimplifyRequest, Tone, MAX_TEXT_CHARS};

/// 编排器的主要组件
///
/// - `SimplifyOrchestrator`: 主状态机
/// - `OrchestratorConfig`: 配置结构体
/// - `TriggerOutcome` / `Phase`: 触发结果与阶段
/// - `ConnectivityProbe` / `AlwaysOnline`: 连通性探针接口与默认实现
pub use orchestrator::{
    AlwaysOnline, ConnectivityProbe, OrchestratorConfig, Phase, SimplifyOrchestrator,
    TriggerOutcome,
};

/// 选区追踪组件
pub use selection::{
    capture_snapshot, SelectionEvent, SelectionSnapshot, SelectionSource, SelectionTracker,
};

/// 流式客户端组件
///
/// - `SimplifyStreamer`: 流式简化器接口，测试注入桩实现
/// - `HttpSimplifier`: 线上 HTTP 实现
/// - `EventStream` / `StreamEvent` / `CancelToken`: 流原语
pub use stream::{
    decode_event_stream, CancelToken, EventStream, HttpSimplifier, SimplifyStreamer, StreamEvent,
    STREAM_TIMEOUT,
};

/// 文档变更组件
pub use mutator::{DomMutator, LiveText, NoopAnchor, ViewportAnchor, SIMPLIFIED_MARKER_ATTR};

/// 撤销组件
pub use undo::{UndoEntry, UndoStack};

/// 共享状态组件
pub use store::{
    schedule_error_dismiss, MemoryStore, SessionState, StateChange, StateStore, SurfacedError,
    ERROR_DISMISS_AFTER,
};

/// 速率闸门组件
pub use rate::{
    now_ms, validate_default_length, validate_length, RateDecision, RateGate, RateWindow,
    RATE_CEILING, RATE_WINDOW_MS,
};

/// 热键组件
pub use hotkeys::{HotkeyRouter, Key, KeyOutcome};
