//! Web 模块的数据类型定义

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::web::config::WebConfig;
use crate::web::rate_limit::FingerprintLimiter;
use crate::web::upstream::UpstreamStreamer;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: WebConfig,
    /// `/api/simplify` 的限速器
    pub limiter: Arc<FingerprintLimiter>,
    /// `/api/playground` 的限速器（上限更宽）
    pub playground_limiter: Arc<FingerprintLimiter>,
    pub upstream: Arc<dyn UpstreamStreamer>,
    pub started_at: Instant,
}

/// 拒绝类响应体（400 / 429）
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(rename = "resetAt", skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
    #[serde(rename = "retryAfterSeconds", skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    /// 构造校验失败响应体
    pub fn validation(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            reset_at: None,
            retry_after_seconds: None,
        }
    }
}

/// 流中的增量帧
#[derive(Debug, Serialize)]
pub struct ChunkFrame<'a> {
    pub chunk: &'a str,
}

/// 流中的完成帧
#[derive(Debug, Serialize)]
pub struct DoneFrame {
    pub done: bool,
}

/// 流中的错误帧
#[derive(Debug, Serialize)]
pub struct ErrorFrame<'a> {
    pub error: &'a str,
    pub message: &'a str,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub checks: HealthChecks,
    #[serde(rename = "responseTimeMs")]
    pub response_time_ms: u64,
}

/// 依赖项检查结果
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub upstream: &'static str,
}
