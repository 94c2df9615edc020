use std::collections::HashMap;

use crate::error::GatewayError;
use crate::retry::retry_after_from_headers;

use super::types::GeminiErrorResponse;

/// 非 2xx 状态分类
pub fn parse_gemini_error(
    status: u16,
    body: &str,
    headers: &HashMap<String, String>,
) -> GatewayError {
    let message = serde_json::from_str::<GeminiErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        429 => GatewayError::RateLimited {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        408 => GatewayError::timeout(message),
        _ => GatewayError::upstream("gemini", status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exhausted_maps_to_rate_limited() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = parse_gemini_error(429, body, &HashMap::new());
        assert!(matches!(err, GatewayError::RateLimited { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn server_error_is_transient_upstream() {
        let err = parse_gemini_error(503, "unavailable", &HashMap::new());
        assert!(err.is_transient());
    }
}
