use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;

use crate::error::GatewayError;
use crate::types::{ChatResponse, ChunkEvent, Vendor};

use super::{AdapterRequest, ChatAdapter, ChatStream, DynAdapter};

const DEFAULT_FRAGMENT_DELAY: Duration = Duration::from_millis(15);

/// Decorator that fakes a chunk stream on top of a non-streaming adapter.
///
/// The wrapped adapter's complete response is split at whitespace boundaries and
/// re-emitted fragment by fragment with a small artificial delay. This satisfies
/// the uniform streaming contract but is an explicit compromise, not true
/// incremental streaming: the full latency of the underlying call is paid before
/// the first fragment appears, so callers must not read timing guarantees into
/// the chunk cadence. Prefer a true incremental adapter whenever the vendor
/// offers one.
pub struct SimulatedStreamAdapter {
    inner: DynAdapter,
    fragment_delay: Duration,
}

impl SimulatedStreamAdapter {
    /// 包装一个非流式 Adapter
    pub fn new(inner: DynAdapter) -> Self {
        Self {
            inner,
            fragment_delay: DEFAULT_FRAGMENT_DELAY,
        }
    }

    /// 自定义片段间延迟 测试中可设为零
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }
}

/// 在空白符后断句 片段拼接严格等于原文
fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
        } else if in_whitespace {
            // 空白段结束 在此断开
            fragments.push(std::mem::take(&mut current));
            in_whitespace = false;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

#[async_trait]
impl ChatAdapter for SimulatedStreamAdapter {
    async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError> {
        self.inner.chat(request).await
    }

    async fn stream_chat(&self, request: AdapterRequest) -> Result<ChatStream, GatewayError> {
        let response = self.inner.chat(request).await?;
        let fragments = split_fragments(&response.content);
        let usage = response.usage.clone();
        let delay = self.fragment_delay;

        let content = stream::iter(fragments).then(move |text| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(ChunkEvent::Content { text })
        });
        let done = stream::once(async move { Ok(ChunkEvent::Done { usage }) });

        Ok(Box::pin(content.chain(done)))
    }

    fn vendor(&self) -> Vendor {
        self.inner.vendor()
    }

    fn supports_streaming(&self) -> bool {
        // 模拟流 不等价于真实增量
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::TokenUsage;

    struct FixedAdapter {
        content: &'static str,
    }

    #[async_trait]
    impl ChatAdapter for FixedAdapter {
        async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError> {
            Ok(ChatResponse {
                content: self.content.to_string(),
                model: request.model,
                vendor: Vendor::GoogleGemini,
                usage: Some(TokenUsage {
                    input_tokens: Some(3),
                    output_tokens: Some(7),
                    total_tokens: Some(10),
                }),
            })
        }

        async fn stream_chat(&self, _request: AdapterRequest) -> Result<ChatStream, GatewayError> {
            Err(GatewayError::UnsupportedFeature {
                feature: "fixed_adapter_stream",
            })
        }

        fn vendor(&self) -> Vendor {
            Vendor::GoogleGemini
        }

        fn supports_streaming(&self) -> bool {
            false
        }
    }

    fn request() -> AdapterRequest {
        AdapterRequest {
            model: "fake-model".to_string(),
            messages: vec![crate::types::ChatMessage::user("hi")],
            sampling: crate::types::SamplingParams::default(),
            max_output_tokens: 128,
            api_key: "key".to_string(),
            timeout: None,
        }
    }

    #[test]
    fn fragments_reassemble_to_original_text() {
        let text = "Hello,  world \n this is  a test";
        let fragments = split_fragments(text);
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn split_fragments_handles_empty_and_single_word() {
        assert!(split_fragments("").is_empty());
        assert_eq!(split_fragments("word"), vec!["word".to_string()]);
    }

    #[tokio::test]
    async fn simulated_stream_reemits_full_content_and_done() {
        let adapter = SimulatedStreamAdapter::new(Arc::new(FixedAdapter {
            content: "one two three",
        }))
        .with_fragment_delay(Duration::ZERO);

        let mut stream = adapter.stream_chat(request()).await.expect("stream");
        let mut collected = String::new();
        let mut saw_done = false;
        while let Some(event) = stream.next().await {
            match event.expect("event") {
                ChunkEvent::Content { text } => collected.push_str(&text),
                ChunkEvent::Done { usage } => {
                    saw_done = true;
                    assert_eq!(usage.and_then(|u| u.total_tokens), Some(10));
                }
            }
        }

        assert_eq!(collected, "one two three");
        assert!(saw_done);
    }
}
