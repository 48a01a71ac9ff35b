//! 事件流解析与编码
//!
//! 协议为按行分隔的事件记录：每条以 `data: ` 前缀开头，后随 JSON 负载，
//! 以空行结束。一次网络读取可能把一条记录从任意字节处切开，解析器持有
//! 跨读取的字节缓冲，只在拿到完整行时解析，余量留待下次读取。

use serde::{Deserialize, Serialize};

/// 单条事件负载
///
/// 合法序列为零或多条 `Chunk`，后随恰好一条终止事件（`Done` 或
/// `Error`）。
#[derive(Debug, Clone, PartialEq)]
pub enum SsePayload {
    /// 追加到累计结果的一段简化文本
    Chunk(String),
    /// 终止：成功
    Done,
    /// 终止：失败
    Error {
        code: String,
        message: String,
        /// 服务端给出的窗口重置时间（ISO-8601，仅限速时出现）
        reset_at: Option<String>,
        retry_after_seconds: Option<u64>,
    },
}

#[derive(Deserialize)]
struct RawPayload {
    chunk: Option<String>,
    done: Option<bool>,
    error: Option<String>,
    message: Option<String>,
    #[serde(rename = "resetAt")]
    reset_at: Option<String>,
    #[serde(rename = "retryAfterSeconds")]
    retry_after_seconds: Option<u64>,
}

/// 跨读取的行缓冲
///
/// 以字节为单位缓存，UTF-8 序列被读取边界切开时同样安全。
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    carry: Vec<u8>,
}

impl SseLineBuffer {
    /// 创建空缓冲
    pub fn new() -> Self {
        Self::default()
    }

    /// 送入一段原始字节，返回其中完整的行
    ///
    /// 未以换行结束的尾部字节留在缓冲中，等待后续读取补齐。
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// 缓冲中尚未成行的字节数
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
}

/// 解析单行事件记录
///
/// 非 `data: ` 前缀的行（空行、注释、心跳）与 JSON 格式损坏的记录
/// 一律返回 `None`，由调用方静默跳过——个别记录损坏不应中断整个流。
pub fn parse_sse_line(line: &str) -> Option<SsePayload> {
    let payload = line.strip_prefix("data: ")?;

    let raw: RawPayload = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!("跳过损坏的事件记录: {}", e);
            return None;
        }
    };

    if let Some(code) = raw.error {
        return Some(SsePayload::Error {
            code,
            message: raw
                .message
                .unwrap_or_else(|| "Something broke. Try again?".to_string()),
            reset_at: raw.reset_at,
            retry_after_seconds: raw.retry_after_seconds,
        });
    }
    if raw.done == Some(true) {
        return Some(SsePayload::Done);
    }
    raw.chunk.map(SsePayload::Chunk)
}

/// 编码一条事件帧（服务端使用）
pub fn encode_sse_frame<T: Serialize>(payload: &T) -> String {
    match serde_json::to_string(payload) {
        Ok(json) => format!("data: {}\n\n", json),
        Err(e) => {
            tracing::error!("事件帧序列化失败: {}", e);
            "data: {\"error\":\"internal_error\",\"message\":\"serialization failure\"}\n\n"
                .to_string()
        }
    }
}
