//! Staged edits to a base version
//!
//! A [`DraftChange`] is one pending edit. Each kind carries exactly the data
//! it needs: an addition names its owning scope, while updates and deletions
//! point at the base finding they target.

use audit_model::{FindingId, FindingPayload, ScopeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of staged edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for DraftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One pending edit against a base version
///
/// # Invariants
/// - An overlay holds at most one change per finding id
/// - `Update` and `Delete` target a finding of the base version
/// - `Add` ids are fresh and never collide with base findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "draft_type", rename_all = "lowercase")]
pub enum DraftChange {
    /// New finding in a base scope
    Add {
        id: FindingId,
        scope_id: ScopeId,
        payload: FindingPayload,
    },
    /// Replacement payload for a base finding
    Update {
        base_finding_id: FindingId,
        payload: FindingPayload,
    },
    /// Removal of a base finding
    Delete { base_finding_id: FindingId },
}

impl DraftChange {
    /// Id this change is keyed by; the finding it creates or targets
    #[inline]
    #[must_use]
    pub fn id(&self) -> &FindingId {
        match self {
            Self::Add { id, .. } => id,
            Self::Update {
                base_finding_id, ..
            }
            | Self::Delete { base_finding_id } => base_finding_id,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DraftKind {
        match self {
            Self::Add { .. } => DraftKind::Add,
            Self::Update { .. } => DraftKind::Update,
            Self::Delete { .. } => DraftKind::Delete,
        }
    }

    /// Target base finding; `None` for additions
    #[inline]
    #[must_use]
    pub fn base_finding_id(&self) -> Option<&FindingId> {
        match self {
            Self::Add { .. } => None,
            Self::Update {
                base_finding_id, ..
            }
            | Self::Delete { base_finding_id } => Some(base_finding_id),
        }
    }

    /// Proposed payload; `None` for deletions
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&FindingPayload> {
        match self {
            Self::Add { payload, .. } | Self::Update { payload, .. } => Some(payload),
            Self::Delete { .. } => None,
        }
    }
}

impl fmt::Display for DraftChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { id, scope_id, .. } => write!(f, "add {id} in {scope_id}"),
            Self::Update {
                base_finding_id, ..
            } => write!(f, "update {base_finding_id}"),
            Self::Delete { base_finding_id } => write!(f, "delete {base_finding_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_model::Severity;

    fn payload() -> FindingPayload {
        FindingPayload::new(
            "Reentrancy",
            "reentrancy",
            Severity::High,
            "external call before state update",
            "apply checks-effects-interactions",
            "SWC-107",
        )
    }

    #[test]
    fn accessors_follow_the_variant() {
        let add = DraftChange::Add {
            id: FindingId::new("f3"),
            scope_id: ScopeId::new("s1"),
            payload: payload(),
        };
        assert_eq!(add.id().as_str(), "f3");
        assert_eq!(add.kind(), DraftKind::Add);
        assert!(add.base_finding_id().is_none());
        assert!(add.payload().is_some());

        let delete = DraftChange::Delete {
            base_finding_id: FindingId::new("f1"),
        };
        assert_eq!(delete.base_finding_id().map(FindingId::as_str), Some("f1"));
        assert!(delete.payload().is_none());
        assert_eq!(delete.to_string(), "delete f1");
    }

    #[test]
    fn wire_shape_is_tagged() {
        let update = DraftChange::Update {
            base_finding_id: FindingId::new("f2"),
            payload: payload(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["draft_type"], "update");
        assert_eq!(json["base_finding_id"], "f2");
        assert_eq!(json["payload"]["type"], "reentrancy");

        let back: DraftChange = serde_json::from_value(json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn delete_carries_no_payload_on_the_wire() {
        let json = serde_json::json!({ "draft_type": "delete", "base_finding_id": "f1" });
        let change: DraftChange = serde_json::from_value(json).unwrap();
        assert_eq!(change.kind(), DraftKind::Delete);
    }
}
