//! Error types for the DandiClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; document errors live in
//! `dandiclaw-patch`.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by gateway: {message}")]
    RateLimited { message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Network(_)
                | ProviderError::Timeout(_)
                | ProviderError::StreamInterrupted(_)
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Stopped after {max_turns} turns without a final answer")]
    MaxTurnsExceeded { max_turns: usize },
}

impl AgentError {
    /// The underlying provider failure, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            AgentError::RetriesExhausted { last, .. } => Some(last),
            AgentError::Provider(e) => Some(e),
            AgentError::MaxTurnsExceeded { .. } => None,
        }
    }
}
