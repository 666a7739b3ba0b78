//! Error types for status tracking

/// Status pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// Push event could not be decoded
    #[error("malformed status event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Event stream failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl StatusError {
    /// Transport failures warrant a user-visible retry affordance
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
