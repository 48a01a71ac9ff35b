//! 上游模型客户端
//!
//! 以流式补全接口调用上游模型，把增量 token 作为文本片段产出。
//! 用户文本只出现在请求体里，任何日志都不落原文。

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::simplify::error::{SimplifyError, SimplifyResult};
use crate::simplify::options::SimplifyOptions;
use crate::simplify::sse::SseLineBuffer;
use crate::web::config::UpstreamConfig;

/// 基础系统指令；tone/depth/profession 在其后追加行
const SYSTEM_PROMPT: &str = "You are a text simplification assistant. When given text, rewrite it so it's clear and easy to understand:
- Match the source language — simplify in whatever language the input is written in
- Preserve structure: paragraphs, bullet points, and headings stay intact
- Replace jargon with plain language (e.g. \"myocardial infarction\" → \"heart attack\")
- Keep numbers, dates, proper nouns (names, places, brands) unchanged
- Preserve code snippets, formulas, and technical notation exactly — only simplify surrounding prose
- Preserve rich formatting hints (bolded words, links) where possible
- Always use casual, friendly tone regardless of source formality
- Adjust simplification intensity based on source complexity — light edits for simple text, heavy rewrite for dense text
- Output ONLY the simplified text — no preamble, no explanations, no quotes";

/// 由选项组装完整的系统指令
pub fn system_instruction(options: &SimplifyOptions) -> String {
    let mut instruction = String::from(SYSTEM_PROMPT);
    instruction.push_str(&format!("\n- Write for {}", options.tone.persona()));
    instruction.push_str(&format!("\n- {}", options.depth.directive()));
    if !options.profession.is_empty() {
        instruction.push_str(&format!(
            "\n- The reader works as {}; use analogies from that field when they help",
            options.profession
        ));
    }
    instruction
}

/// 上游流式补全接口
///
/// 处理器只依赖该接口；测试注入脚本化桩实现，线上使用
/// [`OpenAiClient`]。
pub trait UpstreamStreamer: Send + Sync {
    /// 打开一条补全流，产出文本增量
    fn stream_completion(
        &self,
        text: String,
        options: SimplifyOptions,
    ) -> BoxFuture<'static, SimplifyResult<BoxStream<'static, SimplifyResult<String>>>>;

    /// 健康检查探测
    fn probe(&self) -> BoxFuture<'static, bool> {
        Box::pin(async { true })
    }
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
}

#[derive(Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

/// OpenAI 流式补全客户端
pub struct OpenAiClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl OpenAiClient {
    /// 创建新的客户端
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

struct TokenDecode {
    bytes: BoxStream<'static, SimplifyResult<Vec<u8>>>,
    buffer: SseLineBuffer,
    pending: std::collections::VecDeque<String>,
    finished: bool,
}

/// 把上游的流式响应字节解码为文本增量
///
/// 记录以 `data: ` 前缀逐行到达，`data: [DONE]` 标记结束；个别记录
/// 损坏时跳过，不中断整个流。
fn decode_token_stream(
    bytes: BoxStream<'static, SimplifyResult<Vec<u8>>>,
) -> BoxStream<'static, SimplifyResult<String>> {
    let state = TokenDecode {
        bytes,
        buffer: SseLineBuffer::new(),
        pending: std::collections::VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(token) = st.pending.pop_front() {
                return Some((Ok(token), st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                None => return None,
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                Some(Ok(bytes)) => {
                    for line in st.buffer.push(&bytes) {
                        let Some(payload) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if payload == "[DONE]" {
                            st.finished = true;
                            break;
                        }
                        match serde_json::from_str::<ChatChunk>(payload) {
                            Ok(chunk) => {
                                if let Some(content) = chunk
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|c| c.delta.content)
                                {
                                    if !content.is_empty() {
                                        st.pending.push_back(content);
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!("跳过无法解析的补全记录: {}", e);
                            }
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

impl UpstreamStreamer for OpenAiClient {
    fn stream_completion(
        &self,
        text: String,
        options: SimplifyOptions,
    ) -> BoxFuture<'static, SimplifyResult<BoxStream<'static, SimplifyResult<String>>>> {
        let client = self.client.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let body = json!({
                "model": config.model,
                "messages": [
                    { "role": "system", "content": system_instruction(&options) },
                    { "role": "user", "content": text },
                ],
                "stream": true,
                "max_tokens": config.max_tokens,
            });

            let response = client
                .post(format!("{}/chat/completions", config.base_url))
                .bearer_auth(&config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| SimplifyError::Network {
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(SimplifyError::Upstream {
                    message: format!("upstream returned status {}", status.as_u16()),
                });
            }

            let bytes = response
                .bytes_stream()
                .map(|result| {
                    result.map(|b| b.to_vec()).map_err(|e| SimplifyError::Network {
                        message: e.to_string(),
                    })
                })
                .boxed();

            Ok(decode_token_stream(bytes))
        })
    }

    fn probe(&self) -> BoxFuture<'static, bool> {
        let client = self.client.clone();
        let config = self.config.clone();

        Box::pin(async move {
            client
                .get(format!("{}/models", config.base_url))
                .bearer_auth(&config.api_key)
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false)
        })
    }
}
