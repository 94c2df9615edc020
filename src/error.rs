use std::time::Duration;

use thiserror::Error;

use crate::selector::TaskClass;
use crate::types::Vendor;

/// Aggregates every failure mode exposed by the chat gateway.
///
/// Callers can match on the specific variant to decide whether to retry, wait out a
/// rate limit, or surface an actionable message to the user interface.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A concrete model id was requested that the catalog does not know about.
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },
    /// No candidate of a task-class route exists in the catalog with a configured credential.
    #[error("no model available for task class {task}")]
    NoModelAvailable { task: TaskClass },
    /// The resolved vendor has no configured secret. Never falls back to an
    /// unauthenticated call.
    #[error("missing credential for vendor {vendor}")]
    MissingCredential { vendor: Vendor },
    /// The provider throttled the request (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimited {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Wait duration suggested by the provider before retrying, if any.
        retry_after: Option<Duration>,
    },
    /// The call exceeded its wall-clock deadline (or the provider returned 408).
    #[error("timeout: {message}")]
    Timeout { message: String },
    /// Non-2xx status from an upstream endpoint that is neither 429 nor 408.
    #[error("upstream {provider} error (status {status}): {message}")]
    Upstream {
        /// Name of the upstream, such as `openai` or `gateway`.
        provider: &'static str,
        /// HTTP status code reported by the upstream.
        status: u16,
        /// Error body or message, kept verbatim for debugging.
        message: String,
    },
    /// Transport-layer or networking failure.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The request payload is malformed. Never retried.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// A capability the selected adapter does not implement.
    #[error("feature unsupported: {feature}")]
    UnsupportedFeature { feature: &'static str },
    /// A streaming channel closed before delivering its end-of-stream sentinel.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// An error frame delivered in-band on an otherwise healthy stream.
    ///
    /// The server already normalized and classified the failure before framing it,
    /// so consumers treat this as terminal rather than retrying.
    #[error("stream reported error: {message}")]
    StreamError { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl GatewayError {
    /// Creates a [`GatewayError::Transport`] from a textual description.
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a [`GatewayError::Timeout`] from a textual description.
    pub fn timeout<T: Into<String>>(message: T) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a [`GatewayError::Upstream`] with the given upstream name and status.
    pub fn upstream<T: Into<String>>(provider: &'static str, status: u16, message: T) -> Self {
        Self::Upstream {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Creates a [`GatewayError::Validation`] from a textual description.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may plausibly succeed.
    ///
    /// Transient errors are timeouts, transport failures, 5xx upstream responses,
    /// and streams that died without a sentinel. [`GatewayError::RateLimited`] is
    /// deliberately not transient: its wait time is vendor-specified, so the caller
    /// schedules a single delayed retry instead of exponential backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::StreamClosed { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_retryable_failures() {
        assert!(GatewayError::timeout("deadline").is_transient());
        assert!(GatewayError::transport("connection reset").is_transient());
        assert!(GatewayError::upstream("openai", 503, "overloaded").is_transient());
        assert!(
            GatewayError::StreamClosed {
                message: "eof".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn fatal_errors_are_not_transient() {
        assert!(!GatewayError::upstream("openai", 400, "bad request").is_transient());
        assert!(!GatewayError::validation("empty messages").is_transient());
        assert!(
            !GatewayError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_secs(5)),
            }
            .is_transient()
        );
        assert!(
            !GatewayError::MissingCredential {
                vendor: Vendor::OpenAi
            }
            .is_transient()
        );
        assert!(
            !GatewayError::StreamError {
                message: "already classified".into()
            }
            .is_transient()
        );
    }
}
