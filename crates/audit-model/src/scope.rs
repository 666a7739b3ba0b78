//! Reviewable code units within a code version

use crate::ids::{CodeNodeId, GenericId, ScopeId};
use crate::status::AnalysisStatus;
use serde::{Deserialize, Serialize};

/// One reviewable unit: a function, modifier, or contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    /// Stable reference into the code version
    pub code_node_id: CodeNodeId,
    pub name: String,
    pub signature: String,
    /// Matches the same scope across code edits
    pub generic_id: GenericId,
    #[serde(default)]
    pub status: AnalysisStatus,
}

impl Scope {
    /// Create a scope in the `waiting` state
    #[must_use]
    pub fn new(
        id: impl Into<ScopeId>,
        code_node_id: impl Into<CodeNodeId>,
        name: impl Into<String>,
        signature: impl Into<String>,
        generic_id: impl Into<GenericId>,
    ) -> Self {
        Self {
            id: id.into(),
            code_node_id: code_node_id.into(),
            name: name.into(),
            signature: signature.into(),
            generic_id: generic_id.into(),
            status: AnalysisStatus::Waiting,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: AnalysisStatus) -> Self {
        self.status = status;
        self
    }
}
