use std::collections::HashMap;

use crate::error::GatewayError;
use crate::retry::retry_after_from_headers;

use super::types::OpenAiErrorResponse;

/// 非 2xx 状态分类 429 映射为 RateLimited 并带上 Retry-After
pub fn parse_openai_error(
    status: u16,
    body: &str,
    headers: &HashMap<String, String>,
) -> GatewayError {
    let message = serde_json::from_str::<OpenAiErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        429 => GatewayError::RateLimited {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        408 => GatewayError::timeout(message),
        _ => GatewayError::upstream("openai", status, message),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let headers = HashMap::from([("retry-after".to_string(), "7".to_string())]);
        let err = parse_openai_error(429, r#"{"error":{"message":"slow down"}}"#, &headers);
        match err {
            GatewayError::RateLimited {
                message,
                retry_after,
            } => {
                assert_eq!(message, "slow down");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_falls_back_to_raw_text() {
        let err = parse_openai_error(500, "gateway exploded", &HashMap::new());
        match err {
            GatewayError::Upstream {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(status, 500);
                assert_eq!(message, "gateway exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
