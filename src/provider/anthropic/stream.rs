use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::GatewayError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::types::{ChunkEvent, TokenUsage};

use super::types::AnthropicStreamEvent;

/// 解析 Anthropic SSE 流 以 message_stop 事件收尾
///
/// 用量分两段到达 message_start 携带输入侧 message_delta 携带输出侧
struct AnthropicSseStream {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    pending: VecDeque<Result<ChunkEvent, GatewayError>>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    done_received: bool,
    stream_closed: bool,
}

impl AnthropicSseStream {
    fn new(body: HttpBodyStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            input_tokens: None,
            output_tokens: None,
            done_received: false,
            stream_closed: false,
        }
    }

    fn final_usage(&self) -> Option<TokenUsage> {
        if self.input_tokens.is_none() && self.output_tokens.is_none() {
            return None;
        }
        let total = match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Some(TokenUsage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: total,
        })
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            self.flush_event();
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // event: 行冗余 data 负载自带 type 字段
    }

    fn flush_event(&mut self) {
        if self.data_lines.is_empty() {
            return;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();

        let event = match serde_json::from_str::<AnthropicStreamEvent>(&payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed stream event");
                return;
            }
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                }
            }
            AnthropicStreamEvent::ContentBlockDelta { delta } => {
                if let Some(text) = delta.text {
                    if !text.is_empty() {
                        self.pending.push_back(Ok(ChunkEvent::Content { text }));
                    }
                }
            }
            AnthropicStreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    if usage.output_tokens.is_some() {
                        self.output_tokens = usage.output_tokens;
                    }
                }
            }
            AnthropicStreamEvent::MessageStop => {
                self.done_received = true;
                let usage = self.final_usage();
                self.pending.push_back(Ok(ChunkEvent::Done { usage }));
            }
            AnthropicStreamEvent::Error { error } => {
                self.done_received = true;
                self.pending.push_back(Err(GatewayError::StreamError {
                    message: error
                        .message
                        .unwrap_or_else(|| "provider reported a stream error".to_string()),
                }));
            }
            AnthropicStreamEvent::Ignored => {}
        }
    }

    // 按原始字节缓冲 整行凑齐后才转 UTF-8 多字节字符切在块边界也不损坏
    fn consume_chunk(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches('\n'));
        }
    }
}

impl Stream for AnthropicSseStream {
    type Item = Result<ChunkEvent, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if self.stream_closed {
                return Poll::Ready(None);
            }
            if self.done_received {
                self.stream_closed = true;
                return Poll::Ready(None);
            }

            match self.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.consume_chunk(&bytes),
                Poll::Ready(Some(Err(err))) => {
                    self.stream_closed = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    self.stream_closed = true;
                    if !self.done_received {
                        return Poll::Ready(Some(Err(GatewayError::StreamClosed {
                            message: "stream ended before message_stop".to_string(),
                        })));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pub fn create_stream(body: HttpBodyStream) -> ChatStream {
    Box::pin(AnthropicSseStream::new(body))
}

/// 把错误响应的流式 body 拼成文本
pub async fn collect_stream_text(mut body: HttpBodyStream) -> Result<String, GatewayError> {
    let mut text = String::new();
    while let Some(chunk) = body.next().await {
        text.push_str(&String::from_utf8_lossy(&chunk?));
    }
    Ok(text)
}
