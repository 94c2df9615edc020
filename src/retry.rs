use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Bounded-retry settings shared by the gateway and the client consumer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of operation invocations, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound for any single backoff sleep.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的退避时长 base * 2^attempt 封顶 max_delay
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` with bounded retries and capped exponential backoff.
///
/// The transient predicate decides which failures are worth another attempt;
/// anything else is returned immediately. On exhaustion the last error is
/// returned. `RateLimited` is intentionally excluded by the default predicate
/// ([`GatewayError::is_transient`]) because its wait time is vendor-specified
/// and handled one layer up.
pub async fn with_retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    is_transient: P,
    operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
    P: Fn(&GatewayError) -> bool,
{
    with_retry_observed(policy, is_transient, |_attempt| {}, operation).await
}

/// [`with_retry_if`] 加一个观察钩子 每次排定重试前回调 attempt 从 1 起计
///
/// 网关用它把重试次数送进 MetricsSink
pub async fn with_retry_observed<T, F, Fut, P, O>(
    policy: &RetryPolicy,
    is_transient: P,
    mut on_retry: O,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
    P: Fn(&GatewayError) -> bool,
    O: FnMut(u32),
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<GatewayError> = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt + 1 == attempts {
                    return Err(err);
                }
                let delay = policy.backoff_delay(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, scheduling retry"
                );
                on_retry(attempt + 1);
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    // 只有在循环体至少记录过一次错误时才会走到这里
    Err(last_error.unwrap_or_else(|| GatewayError::transport("retry loop exhausted")))
}

/// [`with_retry_if`] 的默认谓词版本 按 GatewayError::is_transient 判定
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    with_retry_if(policy, GatewayError::is_transient, operation).await
}

/// Extracts the `Retry-After` header (in seconds) if present.
///
/// Providers occasionally instruct clients to wait before re-sending requests. When the
/// header is numeric this helper parses it into a [`Duration`]. HTTP-date values are
/// currently ignored because vendors primarily use the numeric form.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
