use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::http::{
    DynHttpTransport, HttpResponse, HttpStreamResponse, post_json_stream_with_headers,
    post_json_with_headers,
};
use crate::types::{ChatResponse, Vendor};

use super::{AdapterRequest, ChatAdapter, ChatStream};

mod error;
mod request;
mod response;
mod stream;
mod types;

use error::parse_openai_error;
use request::build_openai_body;
use response::map_response;
use stream::{collect_stream_text, create_stream};
use types::OpenAiChatResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI Chat Completions 适配器 真实 SSE 增量流
pub struct OpenAiAdapter {
    transport: DynHttpTransport,
    base_url: String,
}

impl OpenAiAdapter {
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

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn build_headers(&self, api_key: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {api_key}"));
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, GatewayError> {
        let status = response.status;
        let headers = response.headers.clone();
        let text = response.into_string()?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_openai_error(status, &text, &headers))
        }
    }
}

#[async_trait]
impl ChatAdapter for OpenAiAdapter {
    async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError> {
        let body = build_openai_body(&request, false)?;
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(&request.api_key),
            request.timeout,
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: OpenAiChatResponse =
            serde_json::from_str(&text).map_err(|err| GatewayError::Upstream {
                provider: "openai",
                status: 200,
                message: format!("failed to parse response: {err}"),
            })?;
        map_response(parsed, &request.model)
    }

    async fn stream_chat(&self, request: AdapterRequest) -> Result<ChatStream, GatewayError> {
        let body = build_openai_body(&request, true)?;
        let response: HttpStreamResponse = post_json_stream_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(&request.api_key),
            request.timeout,
            &body,
        )
        .await?;
        if !(200..300).contains(&response.status) {
            let headers = response.headers;
            let text = collect_stream_text(response.body).await?;
            return Err(parse_openai_error(response.status, &text, &headers));
        }
        Ok(create_stream(response.body))
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    #[test]
    fn endpoint_tolerates_v1_suffix() {
        let transport = default_dyn_transport().expect("transport");
        let plain = OpenAiAdapter::new(transport.clone());
        assert_eq!(plain.endpoint(), "https://api.openai.com/v1/chat/completions");

        let with_v1 = OpenAiAdapter::new(transport.clone()).with_base_url("https://proxy.local/v1");
        assert_eq!(with_v1.endpoint(), "https://proxy.local/v1/chat/completions");

        let trailing = OpenAiAdapter::new(transport).with_base_url("https://proxy.local/");
        assert_eq!(trailing.endpoint(), "https://proxy.local/v1/chat/completions");
    }
}
