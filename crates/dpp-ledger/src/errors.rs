//! Ledger client errors.

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Request could not be sent or the response body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint answered with a non-success HTTP status.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        message: String,
    },

    /// Endpoint throttled the request.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Response body or provider message.
        message: String,
    },

    /// JSON-RPC error object in an otherwise successful response.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Response did not have the expected shape.
    #[error("malformed response: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
    },

    /// Request exceeded the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Request abandoned because the relay is shutting down.
    #[error("request cancelled")]
    Cancelled,
}

impl LedgerError {
    /// Shorthand for [`LedgerError::Malformed`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status >= 500,
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            // -32005 is the conventional "limit exceeded" code
            Self::Rpc { code, .. } => *code == -32005 || *code == -32603,
            Self::Malformed { .. } | Self::Cancelled => false,
        }
    }

    /// Error category string for logs and metric labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "network",
            Self::Status { .. } => "http",
            Self::RateLimited { .. } => "rate_limit",
            Self::Rpc { .. } => "rpc",
            Self::Malformed { .. } => "parse",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LedgerError::RateLimited { message: "slow down".into() }.is_retryable());
        assert!(LedgerError::Timeout { timeout_ms: 100 }.is_retryable());
        assert!(
            LedgerError::Status {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !LedgerError::Status {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!LedgerError::malformed("bad hex").is_retryable());
        assert!(!LedgerError::Cancelled.is_retryable());
    }

    #[test]
    fn rpc_limit_exceeded_is_retryable() {
        let err = LedgerError::Rpc {
            code: -32005,
            message: "query returned more than 10000 results".into(),
        };
        assert!(err.is_retryable());
        let err = LedgerError::Rpc {
            code: -32602,
            message: "invalid params".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn categories() {
        assert_eq!(LedgerError::RateLimited { message: String::new() }.category(), "rate_limit");
        assert_eq!(LedgerError::malformed("x").category(), "parse");
        assert_eq!(LedgerError::Timeout { timeout_ms: 1 }.category(), "timeout");
        assert_eq!(LedgerError::Cancelled.category(), "cancelled");
        assert_eq!(
            LedgerError::Rpc {
                code: 1,
                message: String::new()
            }
            .category(),
            "rpc"
        );
    }

    #[test]
    fn display_messages() {
        let err = LedgerError::Rpc {
            code: -32000,
            message: "header not found".into(),
        };
        assert_eq!(err.to_string(), "JSON-RPC error -32000: header not found");
        assert_eq!(
            LedgerError::Timeout { timeout_ms: 250 }.to_string(),
            "request timed out after 250ms"
        );
    }
}
