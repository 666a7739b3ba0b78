//! Backing store contract
//!
//! The store owns persisted versions and per-version drafts. A client stages
//! each edit remotely before mirroring it in its local overlay, and asks the
//! store to materialize the draft as a new version on commit.

use crate::change::DraftChange;
use crate::error::StoreError;
use async_trait::async_trait;
use audit_model::{AnalysisVersion, Finding, FindingId, FindingPayload, ScopeId, VersionId};
use serde::{Deserialize, Serialize};

/// Persisted draft for one base version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub base: AnalysisVersion,
    #[serde(default)]
    pub changes: Vec<DraftChange>,
}

/// Store acknowledgement of a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub new_version_id: VersionId,
    pub parent_version_id: VersionId,
}

/// Store acknowledgement of an undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UndoReceipt {
    /// A staged update or delete was dropped; the base finding is visible again
    Restored { finding: Finding },
    /// A staged addition was dropped
    Removed { id: FindingId },
    /// Nothing was staged under that id
    NothingStaged,
}

/// Persistence and commit authority for versions and drafts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch a committed version
    async fn get_version(&self, id: &VersionId) -> Result<AnalysisVersion, StoreError>;

    /// Fetch the draft staged on a version, with the version itself
    async fn get_draft(&self, version_id: &VersionId) -> Result<DraftSnapshot, StoreError>;

    /// Stage an addition under a client-chosen id
    async fn stage_add(
        &self,
        version_id: &VersionId,
        id: &FindingId,
        scope_id: &ScopeId,
        payload: &FindingPayload,
    ) -> Result<DraftChange, StoreError>;

    /// Stage a replacement payload for a base finding or staged addition
    async fn stage_update(
        &self,
        version_id: &VersionId,
        finding_id: &FindingId,
        payload: &FindingPayload,
    ) -> Result<DraftChange, StoreError>;

    /// Stage a delete; `None` when a staged addition was dropped instead
    async fn stage_delete(
        &self,
        version_id: &VersionId,
        finding_id: &FindingId,
    ) -> Result<Option<DraftChange>, StoreError>;

    /// Materialize the draft as a new version whose parent is `version_id`
    async fn commit(&self, version_id: &VersionId) -> Result<CommitReceipt, StoreError>;

    /// Drop one staged change
    async fn undo_staged(&self, version_id: &VersionId, change_id: &FindingId) -> Result<UndoReceipt, StoreError>;
}
