use serde::{Deserialize, Serialize};

/// How a failed model-provider call should be handled by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimit,
    Auth,
    Billing,
    Quota,
    ModelUnavailable,
    ServerError,
    InvalidRequest,
    Unknown,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::Billing => "billing",
            Self::Quota => "quota",
            Self::ModelUnavailable => "model_unavailable",
            Self::ServerError => "server_error",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Shared error type used across all MeshGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("tool '{tool}' panicked: {message}")]
    ToolPanic { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolFailed {
        tool: String,
        message: String,
        retryable: bool,
    },

    #[error("provider {provider} ({kind}): {message}")]
    Provider {
        provider: String,
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("approval required for {0}")]
    ApprovalRequired(String),

    #[error("approval denied for {0}")]
    ApprovalDenied(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("name collision: {0}")]
    Collision(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error came from caller cancellation. Cancellation is
    /// never retried and always propagated.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Whether a tool-level error is worth retrying.
    pub fn is_tool_retryable(&self) -> bool {
        match self {
            Error::ToolFailed { retryable, .. } => *retryable,
            Error::ToolTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_not_retryable() {
        let err = Error::Cancelled("caller went away".into());
        assert!(err.is_cancelled());
        assert!(!err.is_tool_retryable());
    }

    #[test]
    fn tool_timeout_is_retryable() {
        let err = Error::ToolTimeout {
            tool: "web.fetch".into(),
            timeout_ms: 5000,
        };
        assert!(err.is_tool_retryable());
    }

    #[test]
    fn provider_error_renders_kind() {
        let err = Error::Provider {
            provider: "alpha".into(),
            kind: ProviderErrorKind::Billing,
            message: "payment required".into(),
        };
        assert!(err.to_string().contains("billing"));
    }
}
