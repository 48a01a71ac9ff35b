//! 简化管线统一错误处理
//!
//! 提供结构化错误类型和错误处理机制，覆盖从本地校验到流式传输的
//! 全部失败路径。

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 简化错误类型
///
/// 本地校验类错误（`NoSelection`、`TooLong`、`RateLimited` 的客户端侧）
/// 在任何网络请求之前解决；流中错误（`Timeout`、`Upstream`、`Unknown`）
/// 在已写入文档的部分文本之上浮出，不触发回滚。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimplifyError {
    /// 没有可用选区（静默，不向用户展示）
    #[error("no selection")]
    NoSelection,

    /// 文本超出单次请求长度上限
    #[error("{message}")]
    TooLong { message: String },

    /// 触发速率限制（客户端软限制或服务端硬限制）
    #[error("{message}")]
    RateLimited {
        message: String,
        /// 距窗口重置的毫秒数
        retry_after_ms: u64,
        /// 服务端给出的重置时间（如有）
        reset_at: Option<DateTime<Utc>>,
    },

    /// 请求发出前的连通性检查失败
    #[error("You're offline. Reconnect and try again.")]
    Offline,

    /// 客户端在固定时限内未等到流结束
    #[error("That took too long. Hit me again?")]
    Timeout,

    /// 代理或上游模型返回失败
    #[error("{message}")]
    Upstream { message: String },

    /// 传输层错误
    #[error("Network hiccup. Check your connection and try again.")]
    Network { message: String },

    /// 流处理过程中的意外异常
    #[error("{message}")]
    Unknown { message: String },
}

impl SimplifyError {
    /// 检查错误是否可立即重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SimplifyError::NoSelection => false,
            SimplifyError::TooLong { .. } => false, // 需要缩短文本
            SimplifyError::RateLimited { .. } => false, // 需要等待窗口重置
            SimplifyError::Offline => false,        // 需要恢复网络
            SimplifyError::Timeout => true,
            SimplifyError::Upstream { .. } => true,
            SimplifyError::Network { .. } => true,
            SimplifyError::Unknown { .. } => true,
        }
    }

    /// 检查错误是否需要向用户展示
    pub fn user_visible(&self) -> bool {
        !matches!(self, SimplifyError::NoSelection)
    }

    /// 错误在线路协议中的代码
    pub fn wire_code(&self) -> &'static str {
        match self {
            SimplifyError::NoSelection => "no_selection",
            SimplifyError::TooLong { .. } => "text_too_long",
            SimplifyError::RateLimited { .. } => "rate_limit_exceeded",
            SimplifyError::Offline => "offline",
            SimplifyError::Timeout => "timeout",
            SimplifyError::Upstream { .. } => "ai_error",
            SimplifyError::Network { .. } => "network_error",
            SimplifyError::Unknown { .. } => "unknown",
        }
    }

    /// 构造带默认文案的超长错误
    pub fn too_long() -> Self {
        SimplifyError::TooLong {
            message: "Easy there, speed racer. That's too much to chew. \
                      Select a shorter passage (under 5000 characters)."
                .to_string(),
        }
    }

    /// 从服务端终止事件的错误代码还原错误类型
    pub fn from_wire(code: &str, message: String) -> Self {
        match code {
            "text_too_long" => SimplifyError::TooLong { message },
            "rate_limit_exceeded" => SimplifyError::RateLimited {
                message,
                retry_after_ms: 0,
                reset_at: None,
            },
            "timeout" => SimplifyError::Timeout,
            "ai_error" | "internal_error" => SimplifyError::Upstream { message },
            _ => SimplifyError::Unknown { message },
        }
    }
}

/// 错误结果类型别名
pub type SimplifyResult<T> = Result<T, SimplifyError>;
