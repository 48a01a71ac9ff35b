//! 简化管线集成测试
//!
//! 用脚本化桩简化器驱动编排器，验证端到端的替换、失败与撤销行为

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use twelvify::dom::{find_elements, get_node_attr};
use twelvify::simplify::error::SimplifyError;
use twelvify::simplify::mutator::SIMPLIFIED_MARKER_ATTR;
use twelvify::simplify::orchestrator::{OrchestratorConfig, SimplifyOrchestrator, TriggerOutcome};
use twelvify::simplify::selection::{
    capture_snapshot, SelectionEvent, SelectionSource, SelectionTracker,
};
use twelvify::simplify::store::{MemoryStore, StateStore};

mod common;

use common::{paragraph_page, snapshot_for, StubProbe, StubStreamer};

/// 测试完整的流式替换：增量写入、标记包裹、撤销记录、状态收尾
#[tokio::test]
async fn streamed_chunks_replace_selection_and_record_undo() {
    let (page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["Simple ", "words ", "win."]));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let outcome = orchestrator.trigger(Some(snapshot_for(&range))).await;

    assert!(
        matches!(outcome, TriggerOutcome::Completed),
        "trigger should complete, got {:?}",
        outcome
    );
    assert_eq!(page.full_text(), "Simple words win.");

    // 简化产物被包进带标记属性的元素
    let spans = find_elements(&page.document(), "span");
    assert_eq!(spans.len(), 1, "exactly one marker element expected");
    assert_eq!(
        get_node_attr(&spans[0], SIMPLIFIED_MARKER_ATTR).as_deref(),
        Some("true")
    );

    // 撤销栈记录了一条，状态机复位
    assert_eq!(orchestrator.undo_stack().borrow().len(), 1);
    let state = store.snapshot();
    assert!(!state.is_loading);
    assert_eq!(state.simplify_count, 1);
    assert!(state.last_error.is_none());
    assert_eq!(streamer.seen_texts(), vec!["Dense and difficult prose here."]);
}

/// 测试流中失败：已写入的部分文本保留，不记撤销项，错误浮出
#[tokio::test]
async fn mid_stream_failure_keeps_partial_text() {
    let (page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::failing_mid(
        &["Simple ", "words "],
        SimplifyError::Timeout,
    ));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let outcome = orchestrator.trigger(Some(snapshot_for(&range))).await;

    assert!(matches!(
        outcome,
        TriggerOutcome::Rejected(SimplifyError::Timeout)
    ));
    assert_eq!(page.full_text(), "Simple words ", "partial text must remain");
    assert!(orchestrator.undo_stack().borrow().is_empty());

    let state = store.snapshot();
    assert!(!state.is_loading);
    assert_eq!(state.simplify_count, 0);
    let surfaced = state.last_error.expect("timeout should surface to the user");
    assert_eq!(surfaced.error, SimplifyError::Timeout);
}

/// 测试中途取消：取消后不再写入，部分文本保留，不记撤销项也不浮出错误
#[tokio::test(start_paused = true)]
async fn cancel_mid_stream_keeps_partial_text_without_undo() {
    use twelvify::simplify::orchestrator::Phase;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (page, range) = paragraph_page("Dense and difficult prose here.");
            let store = Arc::new(MemoryStore::new());
            let streamer = Arc::new(StubStreamer::hanging_after(&["Simple "]));
            let orchestrator =
                Rc::new(SimplifyOrchestrator::new(store.clone(), streamer.clone()));

            let snapshot = snapshot_for(&range);
            let trigger = tokio::task::spawn_local({
                let orchestrator = orchestrator.clone();
                async move { orchestrator.trigger(Some(snapshot)).await }
            });

            // 等第一段增量写入后再取消
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(page.full_text(), "Simple ");
            orchestrator.cancel();

            let outcome = trigger.await.expect("trigger task should not panic");
            assert!(
                matches!(outcome, TriggerOutcome::Ignored),
                "cancelled trigger should resolve without effect, got {:?}",
                outcome
            );

            // 部分文本保留在文档里，但没有可回退的记录
            assert_eq!(page.full_text(), "Simple ", "partial text must remain");
            assert!(orchestrator.undo_stack().borrow().is_empty());
            assert_eq!(orchestrator.phase(), Phase::Idle);

            let state = store.snapshot();
            assert!(!state.is_loading, "loading flag must be cleared");
            assert_eq!(state.simplify_count, 0);
            assert!(
                state.last_error.is_none(),
                "cancellation must not surface an error"
            );
        })
        .await;
}

/// 测试长度闸门：超长文本在任何网络请求之前被拒绝
#[tokio::test]
async fn oversized_selection_is_rejected_before_any_request() {
    let text = "x".repeat(5001);
    let (page, range) = paragraph_page(&text);
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["unused"]));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let outcome = orchestrator.trigger(Some(snapshot_for(&range))).await;

    assert!(matches!(
        outcome,
        TriggerOutcome::Rejected(SimplifyError::TooLong { .. })
    ));
    assert_eq!(streamer.open_count(), 0, "no stream must be opened");
    assert_eq!(page.full_text(), text, "document must be untouched");
    assert!(store.snapshot().last_error.is_some());
}

/// 测试离线短路：探针报告离线时不发出请求
#[tokio::test]
async fn offline_probe_short_circuits() {
    let (page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["unused"]));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone())
        .with_connectivity(Arc::new(StubProbe(false)));

    let outcome = orchestrator.trigger(Some(snapshot_for(&range))).await;

    assert!(matches!(
        outcome,
        TriggerOutcome::Rejected(SimplifyError::Offline)
    ));
    assert_eq!(streamer.open_count(), 0);
    assert_eq!(page.full_text(), "Dense and difficult prose here.");
}

/// 测试并发守卫：简化在途时的再次触发被无副作用地忽略
#[tokio::test]
async fn second_trigger_while_streaming_is_ignored() {
    let (_page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(
        StubStreamer::completing(&["Short."]).with_open_delay(Duration::from_millis(20)),
    );
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let first = orchestrator.trigger(Some(snapshot_for(&range)));
    let second = orchestrator.trigger(Some(snapshot_for(&range)));
    let (first, second) = futures::join!(first, second);

    assert!(matches!(first, TriggerOutcome::Completed));
    assert!(matches!(second, TriggerOutcome::Ignored));
    assert_eq!(streamer.open_count(), 1, "exactly one stream must be opened");
}

/// 测试客户端软闸门：窗口内超限的触发被拒绝且不发请求
#[tokio::test]
async fn client_rate_gate_rejects_over_ceiling() {
    let (page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["Short."]));
    let config = OrchestratorConfig {
        rate_ceiling: 1,
        ..OrchestratorConfig::default()
    };
    let orchestrator = SimplifyOrchestrator::with_config(store.clone(), streamer.clone(), config);

    let first = orchestrator.trigger(Some(snapshot_for(&range))).await;
    assert!(matches!(first, TriggerOutcome::Completed));

    let range = common::select_paragraph(&page);
    let second = orchestrator.trigger(Some(snapshot_for(&range))).await;
    match second {
        TriggerOutcome::Rejected(SimplifyError::RateLimited { retry_after_ms, .. }) => {
            assert!(retry_after_ms > 0, "retry hint should be positive");
        }
        other => panic!("expected rate limit rejection, got {:?}", other),
    }
    assert_eq!(streamer.open_count(), 1);
}

/// 测试撤销往返：回退后文档与原文逐字相同，且不受选区变化影响
#[tokio::test]
async fn undo_restores_exact_original() {
    let (page, range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["Easy words."]));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let outcome = orchestrator.trigger(Some(snapshot_for(&range))).await;
    assert!(matches!(outcome, TriggerOutcome::Completed));
    assert_eq!(page.full_text(), "Easy words.");

    // 选区随后变化不影响回退
    page.clear_selection();

    assert!(orchestrator.undo_last(), "revert should succeed");
    assert_eq!(page.full_text(), "Dense and difficult prose here.");

    // 空栈回退是无副作用的 no-op
    assert!(!orchestrator.undo_last());
    assert_eq!(page.full_text(), "Dense and difficult prose here.");
}

/// 测试无选区触发：静默失败，不发请求也不浮出错误
#[tokio::test]
async fn trigger_without_selection_is_silent() {
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["unused"]));
    let orchestrator = SimplifyOrchestrator::new(store.clone(), streamer.clone());

    let outcome = orchestrator.trigger(None).await;

    assert!(matches!(
        outcome,
        TriggerOutcome::Rejected(SimplifyError::NoSelection)
    ));
    assert_eq!(streamer.open_count(), 0);
    assert!(
        store.snapshot().last_error.is_none(),
        "missing selection must not surface an error"
    );
}

/// 测试选区去抖：窗口内的连续变化只发布最后一次
#[tokio::test]
async fn selection_events_are_debounced() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (page, _range) = paragraph_page("Some reasonably long text.");
            let tracker = SelectionTracker::new(page.clone() as Rc<dyn SelectionSource>)
                .with_debounce(Duration::from_millis(5));

            let selected = Rc::new(Cell::new(0u32));
            let counter = selected.clone();
            tracker.on_change(move |event| {
                if matches!(event, SelectionEvent::Selected(_)) {
                    counter.set(counter.get() + 1);
                }
            });

            tracker.notify_change();
            tracker.notify_change();
            tracker.notify_change();
            tokio::time::sleep(Duration::from_millis(30)).await;

            assert_eq!(selected.get(), 1, "only the last change may publish");
        })
        .await;
}

/// 测试热键路径：简化键走快路径，Escape 仅在实际回退时上报消费
#[tokio::test]
async fn hotkeys_drive_simplify_and_undo() {
    use twelvify::simplify::hotkeys::{HotkeyRouter, Key, KeyOutcome};

    let (page, _range) = paragraph_page("Dense and difficult prose here.");
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["Easy words."]));
    let orchestrator = Rc::new(SimplifyOrchestrator::new(store.clone(), streamer.clone()));
    let tracker = Rc::new(SelectionTracker::new(page.clone() as Rc<dyn SelectionSource>));
    let router = HotkeyRouter::new(orchestrator, tracker);

    // 栈为空时 Escape 交还宿主
    assert_eq!(router.handle(Key::Escape).await, KeyOutcome::Ignored);

    assert_eq!(router.handle(Key::Simplify).await, KeyOutcome::Consumed);
    assert_eq!(page.full_text(), "Easy words.");
    assert_eq!(streamer.open_count(), 1);

    assert_eq!(router.handle(Key::Escape).await, KeyOutcome::Consumed);
    assert_eq!(page.full_text(), "Dense and difficult prose here.");

    assert_eq!(router.handle(Key::Escape).await, KeyOutcome::Ignored);
}

/// 测试热键无选区：简化键静默交还宿主，不发请求
#[tokio::test]
async fn simplify_hotkey_without_selection_is_silent() {
    use twelvify::simplify::hotkeys::{HotkeyRouter, Key, KeyOutcome};

    let (page, _range) = paragraph_page("Dense and difficult prose here.");
    page.clear_selection();

    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(StubStreamer::completing(&["unused"]));
    let orchestrator = Rc::new(SimplifyOrchestrator::new(store.clone(), streamer.clone()));
    let tracker = Rc::new(SelectionTracker::new(page.clone() as Rc<dyn SelectionSource>));
    let router = HotkeyRouter::new(orchestrator, tracker);

    assert_eq!(
        router.handle(Key::Simplify).await,
        KeyOutcome::Ignored,
        "without a selection the key must stay with the host"
    );
    assert_eq!(streamer.open_count(), 0);
    assert!(store.snapshot().last_error.is_none());
}

/// 测试选区阈值：去除首尾空白后不足四个字符的选区不产生快照
#[test]
fn short_selections_produce_no_snapshot() {
    let (page, _range) = paragraph_page("  abc  ");
    assert!(
        capture_snapshot(page.as_ref()).is_none(),
        "three trimmed chars must stay below the threshold"
    );

    let (page, _range) = paragraph_page("abcd");
    let snapshot = capture_snapshot(page.as_ref()).expect("four chars should qualify");
    assert_eq!(snapshot.text, "abcd");
}
