#![allow(dead_code)]

// 集成测试公共模块
//
// 提供脚本化桩实现和页面构建辅助

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};

use twelvify::dom::{find_elements, PageDocument, SelectionRange};
use twelvify::simplify::error::{SimplifyError, SimplifyResult};
use twelvify::simplify::options::SimplifyOptions;
use twelvify::simplify::orchestrator::ConnectivityProbe;
use twelvify::simplify::rate::now_ms;
use twelvify::simplify::selection::SelectionSnapshot;
use twelvify::simplify::stream::{CancelToken, EventStream, SimplifyStreamer, StreamEvent};

/// 按脚本产出事件的桩简化器
pub struct StubStreamer {
    script: Vec<StreamEvent>,
    fail_open: Option<SimplifyError>,
    open_delay: Option<Duration>,
    hang_until_cancel: bool,
    opens: Arc<AtomicUsize>,
    seen_texts: Arc<Mutex<Vec<String>>>,
}

impl StubStreamer {
    /// 产出给定增量后正常完成
    pub fn completing(chunks: &[&str]) -> Self {
        let mut script: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| StreamEvent::Chunk(c.to_string()))
            .collect();
        script.push(StreamEvent::Done);
        Self::scripted(script)
    }

    /// 产出给定增量后以错误终止
    pub fn failing_mid(chunks: &[&str], error: SimplifyError) -> Self {
        let mut script: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| StreamEvent::Chunk(c.to_string()))
            .collect();
        script.push(StreamEvent::Failed(error));
        Self::scripted(script)
    }

    /// 打开阶段直接失败
    pub fn rejecting(error: SimplifyError) -> Self {
        let mut stub = Self::scripted(Vec::new());
        stub.fail_open = Some(error);
        stub
    }

    /// 产出给定增量后挂起，直到取消信号触发才收尾（无终止事件）
    pub fn hanging_after(chunks: &[&str]) -> Self {
        let script: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| StreamEvent::Chunk(c.to_string()))
            .collect();
        let mut stub = Self::scripted(script);
        stub.hang_until_cancel = true;
        stub
    }

    /// 自定义事件脚本
    pub fn scripted(script: Vec<StreamEvent>) -> Self {
        Self {
            script,
            fail_open: None,
            open_delay: None,
            hang_until_cancel: false,
            opens: Arc::new(AtomicUsize::new(0)),
            seen_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 打开前等待一段时间（并发守卫测试用）
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// 已打开的流数量
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// 历次请求携带的文本
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen_texts.lock().unwrap().clone()
    }
}

impl SimplifyStreamer for StubStreamer {
    fn open(
        &self,
        text: String,
        _options: SimplifyOptions,
        cancel: CancelToken,
    ) -> BoxFuture<'static, SimplifyResult<EventStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.seen_texts.lock().unwrap().push(text);

        let script = self.script.clone();
        let fail_open = self.fail_open.clone();
        let delay = self.open_delay;
        let hang = self.hang_until_cancel;

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = fail_open {
                return Err(error);
            }
            let head = stream::iter(script);
            if hang {
                // 脚本放完后空转等待取消，模拟悬挂的上游
                let tail = stream::unfold(cancel, |cancel| async move {
                    while !cancel.is_cancelled() {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    None::<(StreamEvent, CancelToken)>
                });
                Ok(head.chain(tail).boxed())
            } else {
                Ok(head.boxed())
            }
        })
    }
}

/// 返回固定结果的连通性探针
pub struct StubProbe(pub bool);

impl ConnectivityProbe for StubProbe {
    fn check(&self) -> BoxFuture<'static, bool> {
        let online = self.0;
        Box::pin(async move { online })
    }
}

/// 构建单段落页面并选中整个段落文本
pub fn paragraph_page(text: &str) -> (Rc<PageDocument>, SelectionRange) {
    let page = Rc::new(PageDocument::from_html(&format!("<p>{}</p>", text)));
    let range = select_paragraph(&page);
    (page, range)
}

/// 选中页面第一个 `<p>` 的整个文本节点
pub fn select_paragraph(page: &PageDocument) -> SelectionRange {
    let paragraphs = find_elements(&page.document(), "p");
    let paragraph = paragraphs.first().expect("page should contain a <p>");
    let text_node = paragraph
        .children
        .borrow()
        .first()
        .expect("<p> should contain a text node")
        .clone();
    let range = SelectionRange::whole_node(text_node).expect("child should be a text node");
    page.select(range.node.clone(), range.start, range.end);
    range
}

/// 由选区直接构造快照（绕过追踪器）
pub fn snapshot_for(range: &SelectionRange) -> SelectionSnapshot {
    SelectionSnapshot {
        text: range.text().expect("range should cover valid text"),
        range: range.clone(),
        captured_at_ms: now_ms(),
    }
}
