//! API 请求处理器
//!
//! `/api/simplify` 与 `/api/playground` 以流式事件响应，`/health`
//! 返回 JSON 状态。日志只记元数据（指纹、长度分箱、耗时），任何
//! 路径都不落用户文本原文。

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::Value;
use tokio::time::timeout_at;

use crate::simplify::options::{SimplifyOptions, SimplifyRequest, MAX_PROFESSION_CHARS, MAX_TEXT_CHARS};
use crate::simplify::rate::{now_ms, RateDecision};
use crate::simplify::sse::encode_sse_frame;
use crate::simplify::stream::STREAM_TIMEOUT;
use crate::web::fingerprint::hash_fingerprint;
use crate::web::types::{
    AppState, ChunkFrame, DoneFrame, ErrorBody, ErrorFrame, HealthChecks, HealthResponse,
};
use crate::web::upstream::UpstreamStreamer;

/// 演示端点使用的固定样例文本；绝不流式处理任意用户输入
pub const PLAYGROUND_SAMPLE: &str = "The superfluous utilization of sesquipedalian verbiage \
     inevitably precipitates a profound state of intellectual vertigo for the uninitiated observer.";

/// 校验简化请求体
///
/// 文本为空或超长、profession 超长时给出与线路协议一致的拒绝响应体。
pub fn validate_request(request: &SimplifyRequest) -> Result<(), ErrorBody> {
    if request.text.is_empty() {
        return Err(ErrorBody::validation(
            "validation_error",
            "Text cannot be empty",
        ));
    }
    if request.text.chars().count() > MAX_TEXT_CHARS {
        return Err(ErrorBody::validation(
            "text_too_long",
            "Easy there, speed racer. That's too much to chew. \
             Select a shorter passage (under 5000 characters).",
        ));
    }
    if request.profession.chars().count() > MAX_PROFESSION_CHARS {
        return Err(ErrorBody::validation(
            "validation_error",
            "Profession exceeds 200 characters",
        ));
    }
    Ok(())
}

/// `/api/simplify` 的 429 文案，按分钟取整
pub fn simplify_rate_message(retry_after_seconds: u64) -> String {
    let minutes = ((retry_after_seconds + 59) / 60).max(1);
    format!(
        "Chill, I need a break. Try again in {} minute{}.",
        minutes,
        if minutes == 1 { "" } else { "s" }
    )
}

fn fingerprint_for(addr: &SocketAddr, headers: &HeaderMap) -> String {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    hash_fingerprint(&addr.ip().to_string(), user_agent)
}

fn rate_limited_response(message: String, retry_after_ms: u64, include_reset: bool) -> Response {
    let retry_after_seconds = (retry_after_ms + 999) / 1000;
    let reset_at = include_reset.then(|| {
        (Utc::now() + chrono::Duration::milliseconds(retry_after_ms as i64)).to_rfc3339()
    });
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            error: "rate_limit_exceeded",
            message,
            reset_at,
            retry_after_seconds: Some(retry_after_seconds),
        }),
    )
        .into_response()
}

fn sse_response(rx: mpsc::UnboundedReceiver<Result<String, Infallible>>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            // 反向代理不得缓冲流式响应
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(rx),
    )
        .into_response()
}

/// 驱动一条上游补全流，把增量编码为事件帧写给客户端
///
/// 从打开到结束共用一个绝对时限；超时与上游失败都转为流中错误帧，
/// 此时响应头已发出，状态码无法再改。
async fn drive_stream(
    upstream: Arc<dyn UpstreamStreamer>,
    text: String,
    options: SimplifyOptions,
    tx: mpsc::UnboundedSender<Result<String, Infallible>>,
    fingerprint: String,
    operation: &'static str,
    input_bin: &'static str,
    ai_error_message: &'static str,
) {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + STREAM_TIMEOUT;
    let mut approx_words = 0usize;

    let send = |frame: String| tx.unbounded_send(Ok(frame)).is_ok();

    let mut tokens = match timeout_at(deadline, upstream.stream_completion(text, options)).await {
        Err(_) => {
            tracing::warn!(operation, fingerprint = %fingerprint, "上游补全打开超时");
            send(encode_sse_frame(&ErrorFrame {
                error: "timeout",
                message: "That took too long. Hit me again?",
            }));
            return;
        }
        Ok(Err(e)) => {
            tracing::error!(operation, fingerprint = %fingerprint, error = %e, "上游补全打开失败");
            send(encode_sse_frame(&ErrorFrame {
                error: "ai_error",
                message: ai_error_message,
            }));
            return;
        }
        Ok(Ok(tokens)) => tokens,
    };

    loop {
        match timeout_at(deadline, tokens.next()).await {
            Err(_) => {
                tracing::warn!(
                    operation,
                    fingerprint = %fingerprint,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "流式响应超时"
                );
                send(encode_sse_frame(&ErrorFrame {
                    error: "timeout",
                    message: "That took too long. Hit me again?",
                }));
                return;
            }
            Ok(None) => break,
            Ok(Some(Ok(token))) => {
                approx_words += token.split_whitespace().count();
                // 发送失败说明客户端已断开，静默放弃
                if !send(encode_sse_frame(&ChunkFrame { chunk: &token })) {
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                tracing::error!(
                    operation,
                    fingerprint = %fingerprint,
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "上游补全流失败"
                );
                send(encode_sse_frame(&ErrorFrame {
                    error: "ai_error",
                    message: ai_error_message,
                }));
                return;
            }
        }
    }

    send(encode_sse_frame(&DoneFrame { done: true }));
    tracing::info!(
        operation,
        fingerprint = %fingerprint,
        input_length_bin = input_bin,
        approx_output_words = approx_words,
        duration_ms = started.elapsed().as_millis() as u64,
        "流式响应完成"
    );
}

fn length_bin(chars: usize) -> &'static str {
    if chars < 500 {
        "short"
    } else if chars < 2000 {
        "medium"
    } else {
        "long"
    }
}

/// POST `/api/simplify`
pub async fn simplify(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let fingerprint = fingerprint_for(&addr, &headers);

    if let RateDecision::Limited { retry_after_ms } = state.limiter.check(&fingerprint, now_ms()) {
        let retry_after_seconds = (retry_after_ms + 999) / 1000;
        return rate_limited_response(
            simplify_rate_message(retry_after_seconds),
            retry_after_ms,
            true,
        );
    }

    let request: SimplifyRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::validation("validation_error", e.to_string())),
            )
                .into_response();
        }
    };

    if let Err(rejection) = validate_request(&request) {
        return (StatusCode::BAD_REQUEST, Json(rejection)).into_response();
    }

    let input_bin = length_bin(request.text.chars().count());
    let options = request.options();
    let upstream = state.upstream.clone();

    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(drive_stream(
        upstream,
        request.text,
        options,
        tx,
        fingerprint,
        "simplify",
        input_bin,
        "Something broke. Try again?",
    ));

    sse_response(rx)
}

/// POST `/api/playground`
///
/// 落地页演示端点：只流式处理固定样例，无请求体，限速上限更宽。
pub async fn playground(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let fingerprint = fingerprint_for(&addr, &headers);

    if let RateDecision::Limited { retry_after_ms } =
        state.playground_limiter.check(&fingerprint, now_ms())
    {
        return rate_limited_response(
            "Whoa, slow down! The AI needs a breather. Try again in a moment.".to_string(),
            retry_after_ms,
            false,
        );
    }

    let upstream = state.upstream.clone();

    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(drive_stream(
        upstream,
        PLAYGROUND_SAMPLE.to_string(),
        SimplifyOptions::default(),
        tx,
        fingerprint,
        "playground",
        "short",
        "Something went wrong. Give it another go?",
    ));

    sse_response(rx)
}

/// GET `/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let started = Instant::now();
    let upstream_ok = state.upstream.probe().await;

    let payload = HealthResponse {
        status: if upstream_ok { "ok" } else { "degraded" },
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            upstream: if upstream_ok { "ok" } else { "failed" },
        },
        response_time_ms: started.elapsed().as_millis() as u64,
    };

    let status = if upstream_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(payload)).into_response()
}
