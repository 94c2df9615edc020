use crate::error::GatewayError;
use crate::types::{ChatResponse, Vendor};

use super::types::GeminiGenerateResponse;

/// 拼接首个候选的全部 text part
pub fn map_response(
    response: GeminiGenerateResponse,
    requested_model: &str,
) -> Result<ChatResponse, GatewayError> {
    let content: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if content.is_empty() {
        return Err(GatewayError::Upstream {
            provider: "gemini",
            status: 200,
            message: "response contained no candidate text".to_string(),
        });
    }

    Ok(ChatResponse {
        content,
        model: response
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        vendor: Vendor::GoogleGemini,
        usage: response.usage_metadata.map(|usage| usage.into_token_usage()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_first_candidate_parts() {
        let raw = r#"{
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "there"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 2, "totalTokenCount": 8},
            "modelVersion": "gemini-2.0-flash-001"
        }"#;
        let parsed: GeminiGenerateResponse = serde_json::from_str(raw).expect("parse");
        let response = map_response(parsed, "gemini-2.0-flash").expect("map");

        assert_eq!(response.content, "Hello there");
        assert_eq!(response.model, "gemini-2.0-flash-001");
        assert_eq!(response.vendor, Vendor::GoogleGemini);
        assert_eq!(response.usage.and_then(|u| u.total_tokens), Some(8));
    }

    #[test]
    fn empty_candidates_is_upstream_error() {
        let parsed: GeminiGenerateResponse =
            serde_json::from_str(r#"{"candidates": []}"#).expect("parse");
        assert!(matches!(
            map_response(parsed, "gemini-2.0-flash"),
            Err(GatewayError::Upstream { provider: "gemini", .. })
        ));
    }
}
