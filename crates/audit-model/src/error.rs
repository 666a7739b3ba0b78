//! Error types for the audit model

use crate::ids::{FindingId, ScopeId};
use std::fmt;

/// Model construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Payload failed schema validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A finding references a scope that does not exist in its version
    #[error("finding {finding_id} references missing scope {scope_id}")]
    DanglingFinding {
        finding_id: FindingId,
        scope_id: ScopeId,
    },

    /// Two scopes share an id
    #[error("duplicate scope id: {0}")]
    DuplicateScope(ScopeId),

    /// Two findings share an id
    #[error("duplicate finding id: {0}")]
    DuplicateFinding(FindingId),
}

impl ModelError {
    /// Integrity violations indicate a producer bug, not bad user input
    #[inline]
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

/// One problem with one payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIssue {
    /// Wire name of the field
    pub field: &'static str,
    /// What is wrong with it
    pub reason: &'static str,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

/// Malformed finding payload. Collects every failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    issues: Vec<FieldIssue>,
}

impl ValidationError {
    #[inline]
    #[must_use]
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Single-field error
    #[inline]
    #[must_use]
    pub fn field(field: &'static str, reason: &'static str) -> Self {
        Self::new(vec![FieldIssue { field, reason }])
    }

    #[inline]
    #[must_use]
    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    /// Check whether a given field failed
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid finding payload: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_fields() {
        let err = ValidationError::new(vec![
            FieldIssue {
                field: "name",
                reason: "is blank",
            },
            FieldIssue {
                field: "reference",
                reason: "is blank",
            },
        ]);
        assert_eq!(
            err.to_string(),
            "invalid finding payload: name is blank, reference is blank"
        );
        assert!(err.mentions("reference"));
        assert!(!err.mentions("type"));
    }

    #[test]
    fn integrity_classification() {
        let dangling = ModelError::DanglingFinding {
            finding_id: FindingId::new("f1"),
            scope_id: ScopeId::new("s9"),
        };
        assert!(dangling.is_integrity_violation());

        let invalid = ModelError::from(ValidationError::field("name", "is blank"));
        assert!(!invalid.is_integrity_violation());
    }
}
