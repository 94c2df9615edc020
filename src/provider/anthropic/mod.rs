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

use error::parse_anthropic_error;
use request::build_anthropic_body;
use response::map_response;
use stream::{collect_stream_text, create_stream};
use types::AnthropicMessageResponse;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages 适配器 真实 SSE 增量流
pub struct AnthropicAdapter {
    transport: DynHttpTransport,
    base_url: String,
}

impl AnthropicAdapter {
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
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn build_headers(&self, api_key: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), api_key.to_string());
        headers.insert(
            "anthropic-version".to_string(),
            ANTHROPIC_VERSION.to_string(),
        );
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
            Err(parse_anthropic_error(status, &text, &headers))
        }
    }
}

#[async_trait]
impl ChatAdapter for AnthropicAdapter {
    async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError> {
        let body = build_anthropic_body(&request, false)?;
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(&request.api_key),
            request.timeout,
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: AnthropicMessageResponse =
            serde_json::from_str(&text).map_err(|err| GatewayError::Upstream {
                provider: "anthropic",
                status: 200,
                message: format!("failed to parse response: {err}"),
            })?;
        map_response(parsed, &request.model)
    }

    async fn stream_chat(&self, request: AdapterRequest) -> Result<ChatStream, GatewayError> {
        let body = build_anthropic_body(&request, true)?;
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
            return Err(parse_anthropic_error(response.status, &text, &headers));
        }
        Ok(create_stream(response.body))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }
}
