use crate::error::GatewayError;
use crate::types::{ChatResponse, Vendor};

use super::types::OpenAiChatResponse;

/// 把 OpenAI 响应映射为统一 ChatResponse
pub fn map_response(
    response: OpenAiChatResponse,
    requested_model: &str,
) -> Result<ChatResponse, GatewayError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| GatewayError::Upstream {
            provider: "openai",
            status: 200,
            message: "response contained no message content".to_string(),
        })?;

    Ok(ChatResponse {
        content,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        vendor: Vendor::OpenAi,
        usage: response.usage.map(|usage| usage.into_token_usage()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_first_choice_and_usage() {
        let raw = r#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let parsed: OpenAiChatResponse = serde_json::from_str(raw).expect("parse");
        let response = map_response(parsed, "gpt-4o-mini").expect("map");

        assert_eq!(response.content, "hi there");
        assert_eq!(response.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(response.vendor, Vendor::OpenAi);
        assert_eq!(response.usage.and_then(|u| u.total_tokens), Some(14));
    }

    #[test]
    fn missing_content_is_upstream_error() {
        let parsed: OpenAiChatResponse = serde_json::from_str(r#"{"choices": []}"#).expect("parse");
        assert!(matches!(
            map_response(parsed, "gpt-4o-mini"),
            Err(GatewayError::Upstream { provider: "openai", .. })
        ));
    }
}
