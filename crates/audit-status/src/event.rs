//! Inbound push events

use crate::error::StatusError;
use audit_model::{AnalysisStatus, ScopeId};
use serde::{Deserialize, Serialize};

/// One scope transition, as pushed by the analysis backend
///
/// Unknown fields are ignored when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStatusEvent {
    pub scope_id: ScopeId,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_count: Option<u32>,
}

impl ScopeStatusEvent {
    #[inline]
    #[must_use]
    pub fn new(scope_id: impl Into<ScopeId>, status: AnalysisStatus) -> Self {
        Self {
            scope_id: scope_id.into(),
            status,
            finding_count: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_finding_count(mut self, count: u32) -> Self {
        self.finding_count = Some(count);
        self
    }

    /// Decode a JSON push payload
    ///
    /// # Errors
    /// Returns [`StatusError::MalformedEvent`] for invalid JSON or an unknown status
    pub fn from_json(raw: &str) -> Result<Self, StatusError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_push_shape() {
        let event =
            ScopeStatusEvent::from_json(r#"{"scope_id":"s1","status":"success","finding_count":3}"#)
                .unwrap();
        assert_eq!(event.scope_id.as_str(), "s1");
        assert_eq!(event.status, AnalysisStatus::Success);
        assert_eq!(event.finding_count, Some(3));
    }

    #[test]
    fn ignores_unknown_fields() {
        let event = ScopeStatusEvent::from_json(
            r#"{"scope_id":"s1","status":"processing","worker":"w-4","attempt":2}"#,
        )
        .unwrap();
        assert_eq!(event.status, AnalysisStatus::Processing);
        assert_eq!(event.finding_count, None);
    }

    #[test]
    fn rejects_unknown_status() {
        let result = ScopeStatusEvent::from_json(r#"{"scope_id":"s1","status":"exploded"}"#);
        assert!(matches!(result, Err(StatusError::MalformedEvent(_))));
    }
}
