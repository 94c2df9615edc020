use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::GatewayError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::types::{ChunkEvent, TokenUsage};

/// 解析 OpenAI SSE 流 以 data: [DONE] 收尾
///
/// 无法解析的 data 行记日志后跳过 不中断整条流
struct OpenAiSseStream {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    pending: VecDeque<Result<ChunkEvent, GatewayError>>,
    usage: Option<TokenUsage>,
    done_received: bool,
    stream_closed: bool,
}

impl OpenAiSseStream {
    fn new(body: HttpBodyStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            usage: None,
            done_received: false,
            stream_closed: false,
        }
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            self.flush_event();
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // 其余字段 (event:, id:, 注释行) 对该协议无意义 忽略
    }

    fn flush_event(&mut self) {
        if self.data_lines.is_empty() {
            return;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();

        if payload == "[DONE]" {
            self.done_received = true;
            self.pending.push_back(Ok(ChunkEvent::Done {
                usage: self.usage.take(),
            }));
            return;
        }

        match serde_json::from_str::<super::types::OpenAiStreamChunk>(&payload) {
            Ok(chunk) => {
                if let Some(usage) = chunk.usage {
                    self.usage = Some(usage.into_token_usage());
                }
                let text = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta)
                    .and_then(|delta| delta.content);
                if let Some(text) = text {
                    if !text.is_empty() {
                        self.pending.push_back(Ok(ChunkEvent::Content { text }));
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed stream chunk");
            }
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

impl Stream for OpenAiSseStream {
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
                // [DONE] 之后不再读取剩余字节
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
                            message: "stream ended before completion marker".to_string(),
                        })));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pub fn create_stream(body: HttpBodyStream) -> ChatStream {
    Box::pin(OpenAiSseStream::new(body))
}

/// 把错误响应的流式 body 拼成文本 供错误分类使用
pub async fn collect_stream_text(mut body: HttpBodyStream) -> Result<String, GatewayError> {
    let mut text = String::new();
    while let Some(chunk) = body.next().await {
        text.push_str(&String::from_utf8_lossy(&chunk?));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    fn body_from(frames: Vec<&'static str>) -> HttpBodyStream {
        Box::pin(stream::iter(
            frames
                .into_iter()
                .map(|frame| Ok(frame.as_bytes().to_vec())),
        ))
    }

    async fn collect(body: HttpBodyStream) -> Vec<Result<ChunkEvent, GatewayError>> {
        create_stream(body).collect().await
    }

    #[tokio::test]
    async fn emits_content_per_delta_and_done_with_usage() {
        let body = body_from(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":1,\"total_tokens\":3}}\n\n",
            "data: [DONE]\n\n",
        ]);

        let events = collect(body).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Ok(ChunkEvent::Content { text }) if text == "Hel"));
        assert!(matches!(&events[1], Ok(ChunkEvent::Content { text }) if text == "lo"));
        match &events[2] {
            Ok(ChunkEvent::Done { usage }) => {
                assert_eq!(usage.as_ref().and_then(|u| u.total_tokens), Some(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_split_across_network_chunks_reassemble() {
        let body = body_from(vec![
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"abc\"}}]}\n",
            "\ndata: [DO",
            "NE]\n\n",
        ]);

        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ChunkEvent::Content { text }) if text == "abc"));
        assert!(matches!(&events[1], Ok(ChunkEvent::Done { .. })));
    }

    #[tokio::test]
    async fn multibyte_content_survives_byte_sized_chunks() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n\ndata: [DONE]\n\n";
        let body: HttpBodyStream = Box::pin(stream::iter(
            raw.as_bytes().iter().map(|byte| Ok(vec![*byte])).collect::<Vec<_>>(),
        ));

        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ChunkEvent::Content { text }) if text == "你好"));
        assert!(matches!(&events[1], Ok(ChunkEvent::Done { .. })));
    }

    #[tokio::test]
    async fn malformed_data_line_is_skipped() {
        let body = body_from(vec![
            "data: not json at all\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);

        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ChunkEvent::Content { text }) if text == "ok"));
        assert!(matches!(&events[1], Ok(ChunkEvent::Done { .. })));
    }

    #[tokio::test]
    async fn truncated_stream_yields_stream_closed() {
        let body = body_from(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"half\"}}]}\n\n",
        ]);

        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ChunkEvent::Content { text }) if text == "half"));
        assert!(matches!(&events[1], Err(GatewayError::StreamClosed { .. })));
    }
}
