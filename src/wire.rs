//! 网关到客户端的流式帧编解码
//!
//! 每个事件一行 `data: <json>` 空行分隔 以 `data: [DONE]` 收尾
//! 载荷为 `{"content": ...}` 或 `{"error": ...}` 解不开的载荷视为噪声跳过

use serde::Deserialize;
use serde_json::json;

use crate::types::ChunkEvent;

/// 终止哨兵
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// 解码后的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// 文本增量
    Content(String),
    /// 带内错误 收到后流即终止
    Error(String),
    /// 终止哨兵
    Done,
}

/// 编码一个内容增量帧
pub fn encode_content(text: &str) -> String {
    format!("{DATA_PREFIX} {}\n\n", json!({ "content": text }))
}

/// 编码一个带内错误帧
pub fn encode_error(message: &str) -> String {
    format!("{DATA_PREFIX} {}\n\n", json!({ "error": message }))
}

/// 编码终止哨兵帧
pub fn encode_done() -> String {
    format!("{DATA_PREFIX} {DONE_SENTINEL}\n\n")
}

/// 把规范化事件编码为线上帧 Done 的 usage 不进线上格式
pub fn encode_event(event: &ChunkEvent) -> String {
    match event {
        ChunkEvent::Content { text } => encode_content(text),
        ChunkEvent::Done { .. } => encode_done(),
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 增量推送解析器 对传输层的任意字节切分方式不敏感
///
/// 缓冲保持原始字节 只在凑齐完整行后再转 UTF-8
/// 多字节字符切在两次 feed 之间也不会损坏
/// 尾部的不完整行留在缓冲里 等下一次 feed 补齐
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一段字节 返回其中完整行解出的帧
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::decode_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// 传输结束时调用 处理没有换行收尾的最后一行
    pub fn finish(&mut self) -> Option<FrameEvent> {
        let line = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&line);
        Self::decode_line(line.trim_end_matches('\r'))
    }

    fn decode_line(line: &str) -> Option<FrameEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload == DONE_SENTINEL {
            return Some(FrameEvent::Done);
        }

        match serde_json::from_str::<WirePayload>(payload) {
            Ok(WirePayload {
                content: Some(text),
                ..
            }) => Some(FrameEvent::Content(text)),
            Ok(WirePayload {
                error: Some(message),
                ..
            }) => Some(FrameEvent::Error(message)),
            Ok(_) => {
                tracing::debug!(payload, "frame without content or error ignored");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed frame payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<FrameEvent> {
        let mut events = decoder.feed(bytes);
        if let Some(event) = decoder.finish() {
            events.push(event);
        }
        events
    }

    #[test]
    fn round_trips_content_error_and_done() {
        let wire = format!(
            "{}{}{}",
            encode_content("Hello, "),
            encode_error("boom"),
            encode_done()
        );

        let mut decoder = FrameDecoder::new();
        let events = decode_all(&mut decoder, wire.as_bytes());
        assert_eq!(
            events,
            vec![
                FrameEvent::Content("Hello, ".to_string()),
                FrameEvent::Error("boom".to_string()),
                FrameEvent::Done,
            ]
        );
    }

    #[test]
    fn concatenation_survives_arbitrary_fragmentation() {
        let fragments = ["Hel", "lo, ", "world", " — 你好"];
        let wire: String = fragments
            .iter()
            .map(|fragment| encode_content(fragment))
            .chain(std::iter::once(encode_done()))
            .collect();
        let bytes = wire.as_bytes();

        // 按不同步长切分字节 包括切在多字节字符与行中间
        for step in [1usize, 2, 3, 5, 7, 11, bytes.len()] {
            let mut decoder = FrameDecoder::new();
            let mut collected = String::new();
            let mut done = false;

            for chunk in bytes.chunks(step) {
                for event in decoder.feed(chunk) {
                    match event {
                        FrameEvent::Content(text) => collected.push_str(&text),
                        FrameEvent::Done => done = true,
                        FrameEvent::Error(message) => panic!("unexpected error: {message}"),
                    }
                }
            }

            assert_eq!(collected, fragments.concat(), "step {step}");
            assert!(done, "step {step}");
        }
    }

    #[test]
    fn multibyte_chars_survive_byte_by_byte_feeds() {
        let wire = format!("{}{}", encode_content("你好"), encode_done());

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for byte in wire.as_bytes() {
            events.extend(decoder.feed(&[*byte]));
        }

        assert_eq!(
            events,
            vec![FrameEvent::Content("你好".to_string()), FrameEvent::Done]
        );
    }

    #[test]
    fn malformed_payload_is_skipped_not_fatal() {
        let wire = format!(
            "data: not json\n\n{}data: {{\"other\":1}}\n\n{}",
            encode_content("ok"),
            encode_done()
        );

        let mut decoder = FrameDecoder::new();
        let events = decode_all(&mut decoder, wire.as_bytes());
        assert_eq!(
            events,
            vec![FrameEvent::Content("ok".to_string()), FrameEvent::Done]
        );
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let wire = ": keep-alive comment\nretry: 3000\ndata: [DONE]\n\n";
        let mut decoder = FrameDecoder::new();
        let events = decode_all(&mut decoder, wire.as_bytes());
        assert_eq!(events, vec![FrameEvent::Done]);
    }

    #[test]
    fn finish_flushes_trailing_line_without_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: [DON").is_empty());
        assert!(decoder.feed(b"E]").is_empty());
        assert_eq!(decoder.finish(), Some(FrameEvent::Done));
    }
}
