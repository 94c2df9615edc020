use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::http::{DynHttpTransport, HttpResponse, post_json_with_headers};
use crate::types::{ChatResponse, Vendor};

use super::{AdapterRequest, ChatAdapter, ChatStream};

mod error;
mod request;
mod response;
mod types;

use error::parse_gemini_error;
use request::build_gemini_body;
use response::map_response;
use types::GeminiGenerateResponse;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini generateContent 适配器
///
/// 仅提供完整请求响应 该适配器自身不具备增量流
/// 需要流式语义时由 [`super::simulated::SimulatedStreamAdapter`] 包装
pub struct GeminiAdapter {
    transport: DynHttpTransport,
    base_url: String,
}

impl GeminiAdapter {
    /// 创建带默认 base_url 的适配器
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }

    fn build_headers(&self, api_key: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        // 密钥走专用 header 避免进 URL 与访问日志
        headers.insert("x-goog-api-key".to_string(), api_key.to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, GatewayError> {
        let status = response.status;
        let headers = response.headers.clone();
        let text = response.into_string()?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_gemini_error(status, &text, &headers))
        }
    }
}

#[async_trait]
impl ChatAdapter for GeminiAdapter {
    async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError> {
        let body = build_gemini_body(&request)?;
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(&request.model),
            self.build_headers(&request.api_key),
            request.timeout,
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: GeminiGenerateResponse =
            serde_json::from_str(&text).map_err(|err| GatewayError::Upstream {
                provider: "gemini",
                status: 200,
                message: format!("failed to parse response: {err}"),
            })?;
        map_response(parsed, &request.model)
    }

    async fn stream_chat(&self, _request: AdapterRequest) -> Result<ChatStream, GatewayError> {
        Err(GatewayError::UnsupportedFeature {
            feature: "gemini_streaming",
        })
    }

    fn vendor(&self) -> Vendor {
        Vendor::GoogleGemini
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    #[test]
    fn endpoint_embeds_model_id() {
        let transport = default_dyn_transport().expect("transport");
        let adapter = GeminiAdapter::new(transport);
        assert_eq!(
            adapter.endpoint("gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn stream_chat_is_unsupported() {
        let transport = default_dyn_transport().expect("transport");
        let adapter = GeminiAdapter::new(transport);
        assert!(!adapter.supports_streaming());
        let result = adapter
            .stream_chat(AdapterRequest {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![crate::types::ChatMessage::user("hi")],
                sampling: crate::types::SamplingParams::default(),
                max_output_tokens: 64,
                api_key: "key".to_string(),
                timeout: None,
            })
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::UnsupportedFeature { .. })
        ));
    }
}
