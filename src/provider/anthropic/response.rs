use crate::error::GatewayError;
use crate::types::{ChatResponse, TokenUsage, Vendor};

use super::types::{AnthropicMessageResponse, AnthropicUsage};

pub fn token_usage(usage: AnthropicUsage) -> TokenUsage {
    let total = match (usage.input_tokens, usage.output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    };
    TokenUsage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: total,
    }
}

/// 拼接全部 text 块作为响应正文
pub fn map_response(
    response: AnthropicMessageResponse,
    requested_model: &str,
) -> Result<ChatResponse, GatewayError> {
    let content: String = response
        .content
        .iter()
        .filter(|block| block.block_type.as_deref() == Some("text"))
        .filter_map(|block| block.text.as_deref())
        .collect();

    if content.is_empty() {
        return Err(GatewayError::Upstream {
            provider: "anthropic",
            status: 200,
            message: "response contained no text content".to_string(),
        });
    }

    Ok(ChatResponse {
        content,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        vendor: Vendor::Anthropic,
        usage: response.usage.map(token_usage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_text_blocks() {
        let raw = r#"{
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 9, "output_tokens": 5}
        }"#;
        let parsed: AnthropicMessageResponse = serde_json::from_str(raw).expect("parse");
        let response = map_response(parsed, "claude-sonnet-4-20250514").expect("map");

        assert_eq!(response.content, "Hello, world");
        assert_eq!(response.vendor, Vendor::Anthropic);
        let usage = response.usage.expect("usage");
        assert_eq!(usage.input_tokens, Some(9));
        assert_eq!(usage.total_tokens, Some(14));
    }

    #[test]
    fn empty_content_is_upstream_error() {
        let parsed: AnthropicMessageResponse =
            serde_json::from_str(r#"{"content": []}"#).expect("parse");
        assert!(matches!(
            map_response(parsed, "claude-sonnet-4-20250514"),
            Err(GatewayError::Upstream { provider: "anthropic", .. })
        ));
    }
}
