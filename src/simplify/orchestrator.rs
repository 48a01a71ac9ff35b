//! 简化编排器
//!
//! 串联选区捕获、前置校验、流式请求、文档变更与撤销记录的主状态机。
//! 同一时刻最多一次简化在途；流式读取与文档写入解耦，读取永远不被
//! 展示节奏拖慢。
//!
//! 文档句柄不可跨线程，编排器整体运行在单线程上下文
//! （`tokio::task::LocalSet`），只有网络读取任务跑在多线程运行时上。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::simplify::error::SimplifyError;
use crate::simplify::mutator::DomMutator;
use crate::simplify::options::{SimplifyOptions, MAX_TEXT_CHARS};
use crate::simplify::rate::{now_ms, validate_length, RateDecision, RateGate, RATE_CEILING, RATE_WINDOW_MS};
use crate::simplify::selection::SelectionSnapshot;
use crate::simplify::store::{schedule_error_dismiss, StateChange, StateStore, ERROR_DISMISS_AFTER};
use crate::simplify::stream::{CancelToken, SimplifyStreamer, StreamEvent};
use crate::simplify::undo::{UndoEntry, UndoStack};

/// 连通性探针
///
/// 请求发出前的快速在线检查。测试注入桩实现，无法判定时一律返回
/// `true`，让真实请求自己失败。
pub trait ConnectivityProbe: Send + Sync {
    /// 当前是否在线
    fn check(&self) -> BoxFuture<'static, bool>;
}

/// 恒定在线的探针（默认）
#[derive(Debug, Default)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn check(&self) -> BoxFuture<'static, bool> {
        Box::pin(async { true })
    }
}

/// 编排器当前阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 空闲，可接受新触发
    Idle,
    /// 前置校验中
    Checking,
    /// 增量写入中
    Streaming,
    /// 收尾（包标记、记撤销）
    Finalizing,
}

/// 一次触发的结果
#[derive(Debug)]
pub enum TriggerOutcome {
    /// 简化完成并已记录撤销项
    Completed,
    /// 被拒绝或中途失败
    Rejected(SimplifyError),
    /// 已有简化在途或流被取消，本次触发无副作用地忽略
    Ignored,
}

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 客户端软闸门窗口内上限
    pub rate_ceiling: u32,
    /// 客户端软闸门窗口时长（毫秒）
    pub rate_window_ms: u64,
    /// 单次请求文本长度上限（Unicode 标量数）
    pub max_text_chars: usize,
    /// 逐字符写入的展示节奏；`None` 表示增量到达即整段写入
    pub typing_delay: Option<Duration>,
    /// 用户可见错误的自动消散时限
    pub error_dismiss_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rate_ceiling: RATE_CEILING,
            rate_window_ms: RATE_WINDOW_MS,
            max_text_chars: MAX_TEXT_CHARS,
            typing_delay: None,
            error_dismiss_after: ERROR_DISMISS_AFTER,
        }
    }
}

/// 简化编排器
pub struct SimplifyOrchestrator {
    store: Arc<dyn StateStore>,
    streamer: Arc<dyn SimplifyStreamer>,
    connectivity: Arc<dyn ConnectivityProbe>,
    gate: RateGate,
    mutator: DomMutator,
    undo: Rc<RefCell<UndoStack>>,
    phase: Cell<Phase>,
    options: RefCell<SimplifyOptions>,
    config: OrchestratorConfig,
    cancel: RefCell<Option<CancelToken>>,
}

impl SimplifyOrchestrator {
    /// 以默认配置创建编排器
    pub fn new(store: Arc<dyn StateStore>, streamer: Arc<dyn SimplifyStreamer>) -> Self {
        Self::with_config(store, streamer, OrchestratorConfig::default())
    }

    /// 以给定配置创建编排器
    pub fn with_config(
        store: Arc<dyn StateStore>,
        streamer: Arc<dyn SimplifyStreamer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            streamer,
            connectivity: Arc::new(AlwaysOnline),
            gate: RateGate::new(config.rate_ceiling, config.rate_window_ms),
            mutator: DomMutator::new(),
            undo: Rc::new(RefCell::new(UndoStack::new())),
            phase: Cell::new(Phase::Idle),
            options: RefCell::new(SimplifyOptions::default()),
            config,
            cancel: RefCell::new(None),
        }
    }

    /// 注入连通性探针
    pub fn with_connectivity(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = probe;
        self
    }

    /// 注入文档变更器（带真实视口锚点时使用）
    pub fn with_mutator(mut self, mutator: DomMutator) -> Self {
        self.mutator = mutator;
        self
    }

    /// 当前阶段
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// 撤销栈（展示层查询降级入口时使用）
    pub fn undo_stack(&self) -> Rc<RefCell<UndoStack>> {
        self.undo.clone()
    }

    /// 更新简化选项（语气、粒度、行业）
    pub fn set_options(&self, options: SimplifyOptions) {
        *self.options.borrow_mut() = options;
    }

    /// 当前简化选项
    pub fn options(&self) -> SimplifyOptions {
        self.options.borrow().clone()
    }

    /// 触发一次简化
    ///
    /// 校验顺序固定：选区、连通性、速率闸门、长度。全部通过后才发出
    /// 网络请求，开流成功后才发生第一次文档变更。已有简化在途时无
    /// 副作用地返回 [`TriggerOutcome::Ignored`]。
    pub async fn trigger(&self, snapshot: Option<SelectionSnapshot>) -> TriggerOutcome {
        if self.phase.get() != Phase::Idle {
            tracing::debug!("已有简化在途，忽略本次触发");
            return TriggerOutcome::Ignored;
        }
        self.phase.set(Phase::Checking);

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            // 无选区静默失败，不打扰用户
            None => return self.reject(SimplifyError::NoSelection),
        };

        if !self.connectivity.check().await {
            return self.reject(SimplifyError::Offline);
        }

        if let RateDecision::Limited { retry_after_ms } = self.gate.try_acquire(now_ms()) {
            return self.reject(SimplifyError::RateLimited {
                message: "Whoa, slow down! The AI needs a breather. Try again in a moment."
                    .to_string(),
                retry_after_ms,
                reset_at: None,
            });
        }

        if let Err(e) = validate_length(&snapshot.text, self.config.max_text_chars) {
            return self.reject(e);
        }

        self.store.apply(StateChange::LoadingChanged(true));

        let cancel = CancelToken::new();
        *self.cancel.borrow_mut() = Some(cancel.clone());

        let events = match self
            .streamer
            .open(snapshot.text.clone(), self.options(), cancel)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                // 开流失败时尚无任何文档变更
                self.store.apply(StateChange::LoadingChanged(false));
                return self.reject(e);
            }
        };

        let live = match self.mutator.begin_replacement(&snapshot.range) {
            Ok(live) => live,
            Err(e) => {
                self.store.apply(StateChange::LoadingChanged(false));
                return self.reject(e);
            }
        };

        self.phase.set(Phase::Streaming);

        // 读取任务跑在多线程运行时上，经无界通道送回本线程，文档写入
        // 节奏再慢也不会反压网络读取
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.next().await {
                let terminal = !matches!(event, StreamEvent::Chunk(_));
                if tx.send(event).is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
        });

        let mut accumulated = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    if let Some(delay) = self.config.typing_delay {
                        for ch in chunk.chars() {
                            accumulated.push(ch);
                            if let Err(e) = self.mutator.apply_increment(&live, &accumulated) {
                                return self.fail_streaming(e);
                            }
                            tokio::time::sleep(delay).await;
                        }
                    } else {
                        accumulated.push_str(&chunk);
                        if let Err(e) = self.mutator.apply_increment(&live, &accumulated) {
                            return self.fail_streaming(e);
                        }
                    }
                }
                StreamEvent::Done => {
                    self.phase.set(Phase::Finalizing);
                    if let Err(e) = self.mutator.finalize(&live) {
                        return self.fail_streaming(e);
                    }
                    self.undo.borrow_mut().push(UndoEntry {
                        original_text: snapshot.text.clone(),
                        simplified_text: accumulated.clone(),
                        node: live.node().clone(),
                    });
                    self.store
                        .apply(StateChange::SimplifyComplete { at_ms: now_ms() });
                    self.cancel.borrow_mut().take();
                    self.phase.set(Phase::Idle);
                    tracing::debug!(chars = accumulated.chars().count(), "简化完成");
                    return TriggerOutcome::Completed;
                }
                StreamEvent::Failed(e) => {
                    // 已写入的部分文本保持原样
                    return self.fail_streaming(e);
                }
            }
        }

        // 流被取消：部分文本保留，不记撤销项
        tracing::debug!("流在终止事件前结束（已取消）");
        self.store.apply(StateChange::LoadingChanged(false));
        self.cancel.borrow_mut().take();
        self.phase.set(Phase::Idle);
        TriggerOutcome::Ignored
    }

    /// 回退最近一次简化
    ///
    /// 仅在空闲时生效；栈空或目标节点已脱离文档时返回 `false`。
    pub fn undo_last(&self) -> bool {
        if self.phase.get() != Phase::Idle {
            return false;
        }
        self.undo.borrow_mut().revert_last()
    }

    /// 取消在途的流式请求（若有）
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.borrow().as_ref() {
            token.cancel();
        }
    }

    /// 前置校验拒绝路径：浮出可见错误并复位
    fn reject(&self, error: SimplifyError) -> TriggerOutcome {
        self.surface(&error);
        self.phase.set(Phase::Idle);
        TriggerOutcome::Rejected(error)
    }

    /// 流中失败路径：复位加载态、浮出错误、保留已写入文本
    fn fail_streaming(&self, error: SimplifyError) -> TriggerOutcome {
        self.store.apply(StateChange::LoadingChanged(false));
        self.surface(&error);
        self.cancel.borrow_mut().take();
        self.phase.set(Phase::Idle);
        TriggerOutcome::Rejected(error)
    }

    fn surface(&self, error: &SimplifyError) {
        if !error.user_visible() {
            return;
        }
        let raised_at_ms = now_ms();
        self.store.apply(StateChange::SimplifyFailed {
            error: error.clone(),
            raised_at_ms,
        });
        schedule_error_dismiss(
            self.store.clone(),
            raised_at_ms,
            self.config.error_dismiss_after,
        );
    }
}
