use std::collections::HashMap;

use crate::error::GatewayError;
use crate::retry::retry_after_from_headers;

use super::types::AnthropicErrorResponse;

/// 非 2xx 状态分类 与 openai 侧保持一致的变体选择
pub fn parse_anthropic_error(
    status: u16,
    body: &str,
    headers: &HashMap<String, String>,
) -> GatewayError {
    let message = serde_json::from_str::<AnthropicErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        429 => GatewayError::RateLimited {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        408 => GatewayError::timeout(message),
        _ => GatewayError::upstream("anthropic", status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_is_upstream_and_transient() {
        let err = parse_anthropic_error(
            529,
            r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &HashMap::new(),
        );
        assert!(err.is_transient());
        assert!(matches!(
            err,
            GatewayError::Upstream { provider: "anthropic", status: 529, .. }
        ));
    }

    #[test]
    fn rate_limit_without_header_has_no_retry_after() {
        let err = parse_anthropic_error(429, "{}", &HashMap::new());
        assert!(matches!(
            err,
            GatewayError::RateLimited { retry_after: None, .. }
        ));
    }
}
