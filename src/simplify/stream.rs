//! 流式简化客户端
//!
//! 打开一条到代理服务的流式请求，解析增量事件协议，向调用方产出
//! 简化文本增量或终止错误。产出序列是惰性、单向、一次性的——
//! 不可重启，新的尝试需要新的调用。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;

use crate::simplify::error::{SimplifyError, SimplifyResult};
use crate::simplify::options::{SimplifyOptions, SimplifyRequest};
use crate::simplify::sse::{parse_sse_line, SseLineBuffer, SsePayload};

/// 从调用开始计的流式请求总时限
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// 流事件
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 一段简化文本增量
    Chunk(String),
    /// 终止：成功
    Done,
    /// 终止：失败
    Failed(SimplifyError),
}

/// 惰性事件序列；`Done`/`Failed` 之后不再产出
pub type EventStream = BoxStream<'static, StreamEvent>;

/// 协作式取消信号
///
/// 取消后不再产出增量；已写入文档的内容保持原样。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// 创建未触发的取消信号
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 查询是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 流式简化器接口
///
/// 编排器只依赖该接口；测试注入脚本化桩实现，线上使用
/// [`HttpSimplifier`]。
pub trait SimplifyStreamer: Send + Sync {
    /// 打开一条简化流
    ///
    /// 打开阶段（状态码与响应头）失败时直接返回错误，此时调用方尚未
    /// 发生任何文档变更。
    fn open(
        &self,
        text: String,
        options: SimplifyOptions,
        cancel: CancelToken,
    ) -> BoxFuture<'static, SimplifyResult<EventStream>>;
}

#[derive(Deserialize)]
struct FailureBody {
    error: Option<String>,
    message: Option<String>,
    #[serde(rename = "resetAt")]
    reset_at: Option<String>,
    #[serde(rename = "retryAfterSeconds")]
    retry_after_seconds: Option<u64>,
}

/// 由终止事件字段构造错误，补齐限速重试信息
fn terminal_error(
    code: &str,
    message: String,
    reset_at: Option<String>,
    retry_after_seconds: Option<u64>,
) -> SimplifyError {
    if code == "rate_limit_exceeded" {
        let reset_at: Option<DateTime<Utc>> = reset_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let retry_after_ms = retry_after_seconds
            .map(|s| s.saturating_mul(1000))
            .or_else(|| {
                reset_at.map(|at| (at - Utc::now()).num_milliseconds().max(0) as u64)
            })
            .unwrap_or(0);
        return SimplifyError::RateLimited {
            message,
            retry_after_ms,
            reset_at,
        };
    }
    SimplifyError::from_wire(code, message)
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, SimplifyError>>,
    buffer: SseLineBuffer,
    pending: VecDeque<SsePayload>,
    deadline: Instant,
    cancel: CancelToken,
    finished: bool,
}

/// 将原始字节流解码为事件流
///
/// 独立于 HTTP 传输层，测试可直接注入脚本化字节流验证切分与超时
/// 行为。`deadline` 为绝对时限，超过后产出 `Timeout` 并终止。
pub fn decode_event_stream(
    bytes: BoxStream<'static, Result<Vec<u8>, SimplifyError>>,
    deadline: Instant,
    cancel: CancelToken,
) -> EventStream {
    let state = DecodeState {
        bytes,
        buffer: SseLineBuffer::new(),
        pending: VecDeque::new(),
        deadline,
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(payload) = st.pending.pop_front() {
                let event = match payload {
                    SsePayload::Chunk(chunk) => StreamEvent::Chunk(chunk),
                    SsePayload::Done => {
                        st.finished = true;
                        StreamEvent::Done
                    }
                    SsePayload::Error {
                        code,
                        message,
                        reset_at,
                        retry_after_seconds,
                    } => {
                        st.finished = true;
                        StreamEvent::Failed(terminal_error(
                            &code,
                            message,
                            reset_at,
                            retry_after_seconds,
                        ))
                    }
                };
                return Some((event, st));
            }

            // 取消后静默收尾，不再读取传输层
            if st.cancel.is_cancelled() {
                tracing::debug!("流已被调用方取消");
                return None;
            }

            match tokio::time::timeout_at(st.deadline, st.bytes.next()).await {
                Err(_) => {
                    st.finished = true;
                    return Some((StreamEvent::Failed(SimplifyError::Timeout), st));
                }
                Ok(None) => {
                    // 未见终止事件即断流，按上游错误处理
                    st.finished = true;
                    return Some((
                        StreamEvent::Failed(SimplifyError::Upstream {
                            message: "Stream ended before completion.".to_string(),
                        }),
                        st,
                    ));
                }
                Ok(Some(Err(e))) => {
                    st.finished = true;
                    return Some((StreamEvent::Failed(e), st));
                }
                Ok(Some(Ok(bytes))) => {
                    for line in st.buffer.push(&bytes) {
                        if let Some(payload) = parse_sse_line(&line) {
                            st.pending.push_back(payload);
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

/// 基于 HTTP 的流式简化器
pub struct HttpSimplifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSimplifier {
    /// 创建指向给定代理端点的简化器
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: STREAM_TIMEOUT,
        }
    }

    /// 覆盖默认时限（测试用）
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SimplifyStreamer for HttpSimplifier {
    fn open(
        &self,
        text: String,
        options: SimplifyOptions,
        cancel: CancelToken,
    ) -> BoxFuture<'static, SimplifyResult<EventStream>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            let request = SimplifyRequest::new(text, &options);

            let response =
                tokio::time::timeout_at(deadline, client.post(&endpoint).json(&request).send())
                    .await
                    .map_err(|_| SimplifyError::Timeout)?
                    .map_err(|e| SimplifyError::Network {
                        message: e.to_string(),
                    })?;

            let status = response.status();
            if !status.is_success() {
                let body = tokio::time::timeout_at(deadline, response.text())
                    .await
                    .map_err(|_| SimplifyError::Timeout)?
                    .unwrap_or_default();
                return Err(failure_from_status(status.as_u16(), &body));
            }

            let bytes = response
                .bytes_stream()
                .map(|result| {
                    result.map(|b| b.to_vec()).map_err(|e| SimplifyError::Network {
                        message: e.to_string(),
                    })
                })
                .boxed();

            Ok(decode_event_stream(bytes, deadline, cancel))
        })
    }
}

/// 将非成功状态码与响应体映射为错误
fn failure_from_status(status: u16, body: &str) -> SimplifyError {
    let parsed: FailureBody = serde_json::from_str(body).unwrap_or(FailureBody {
        error: None,
        message: None,
        reset_at: None,
        retry_after_seconds: None,
    });
    let code = parsed.error.unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| "Something broke. Try again?".to_string());

    match status {
        429 => terminal_error(
            "rate_limit_exceeded",
            message,
            parsed.reset_at,
            parsed.retry_after_seconds,
        ),
        400 if code == "text_too_long" => SimplifyError::TooLong { message },
        _ => SimplifyError::Upstream { message },
    }
}
