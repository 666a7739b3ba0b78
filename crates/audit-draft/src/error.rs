//! Error types for drafts and commits
//!
//! Mirrors the lifecycle's failure taxonomy:
//! - [`DraftError::Validation`]: malformed payload, rejected before staging
//! - [`DraftError::NotFound`]: stale or foreign id, a caller bug
//! - [`DraftError::CommitConflict`]: store refused the commit, draft kept for retry
//! - [`DraftError::Transport`]: request failed, surfaced with a retry affordance
//! - [`DraftError::NothingToCommit`]: empty overlay, never sent to the store

use audit_model::{ModelError, ValidationError};
use std::fmt;

/// Kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Version,
    Scope,
    Finding,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Version => "version",
            Self::Scope => "scope",
            Self::Finding => "finding",
        })
    }
}

/// Main draft error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// Payload failed schema validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Id does not resolve in the current base version
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Store rejected the commit
    #[error("commit conflict: {0}")]
    CommitConflict(String),

    /// Request or event stream failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Overlay has no staged changes
    #[error("nothing to commit")]
    NothingToCommit,

    /// Data violates a model invariant
    #[error("integrity violation: {0}")]
    Integrity(ModelError),

    /// Version graph rejected an operation
    #[error("version graph: {0}")]
    Graph(#[from] GraphError),
}

impl DraftError {
    #[inline]
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Programming-error class; the UI should never have offered the action
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Integrity(_) | Self::Graph(_))
    }

    /// Safe to offer a manual retry. Commits are never retried automatically.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::CommitConflict(_))
    }

    /// Shown to the user as an actionable message
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<ModelError> for DraftError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Validation(v) => Self::Validation(v),
            other => Self::Integrity(other),
        }
    }
}

/// Backing store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Commit refused, e.g. the base version moved concurrently
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store-side validation refused a payload
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("integrity: {0}")]
    Integrity(ModelError),
}

impl From<StoreError> for DraftError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::Conflict(reason) => Self::CommitConflict(reason),
            StoreError::Rejected(v) => Self::Validation(v),
            StoreError::Transport(reason) => Self::Transport(reason),
            StoreError::Integrity(e) => Self::Integrity(e),
        }
    }
}

impl From<DraftError> for StoreError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::Validation(v) => Self::Rejected(v),
            DraftError::NotFound { kind, id } => Self::NotFound { kind, id },
            DraftError::Integrity(e) => Self::Integrity(e),
            DraftError::CommitConflict(reason) => Self::Conflict(reason),
            DraftError::NothingToCommit => Self::Conflict("no staged changes".to_string()),
            DraftError::Transport(reason) => Self::Transport(reason),
            DraftError::Graph(e) => Self::Conflict(e.to_string()),
        }
    }
}

/// Version graph errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("version already recorded: {0}")]
    DuplicateVersion(String),

    #[error("unknown version: {0}")]
    UnknownVersion(String),

    #[error("parent link would create a cycle at {0}")]
    CycleDetected(String),
}
