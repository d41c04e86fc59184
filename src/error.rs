use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a single fetch against the Asana API
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to construct endpoint for `{path}`: {reason}")]
    Endpoint { path: String, reason: String },

    #[error("failed to construct HTTP request: {0}")]
    RequestConstruction(String),

    #[error("failed to get response from the endpoint: {0}")]
    Transport(String),

    #[error("rate limited by upstream API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("failed to parse response body: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ExtractError {
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
