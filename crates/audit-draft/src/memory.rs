//! In-process backing store
//!
//! [`InMemoryStore`] keeps versions and drafts in memory and commits
//! synchronously. It backs the CLI's offline mode and the test suites, and
//! can be told to fail so retry paths are exercised.

use crate::change::DraftChange;
use crate::error::{EntityKind, StoreError};
use crate::overlay::{DeleteOutcome, DraftOverlay};
use crate::store::{BackingStore, CommitReceipt, DraftSnapshot, UndoReceipt};
use async_trait::async_trait;
use audit_model::{AnalysisVersion, FindingId, FindingPayload, ScopeId, VersionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct StoreState {
    versions: HashMap<VersionId, Arc<AnalysisVersion>>,
    drafts: HashMap<VersionId, DraftOverlay>,
    offline: bool,
    fail_next_commit: Option<StoreError>,
    commit_calls: u64,
}

impl StoreState {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Transport("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn version(&self, id: &VersionId) -> Result<&Arc<AnalysisVersion>, StoreError> {
        self.versions.get(id).ok_or_else(|| StoreError::NotFound {
            kind: EntityKind::Version,
            id: id.to_string(),
        })
    }

    fn draft_mut(&mut self, version_id: &VersionId) -> Result<&mut DraftOverlay, StoreError> {
        self.check_online()?;
        let version = self.versions.get(version_id).ok_or_else(|| StoreError::NotFound {
            kind: EntityKind::Version,
            id: version_id.to_string(),
        })?;
        Ok(self
            .drafts
            .entry(version_id.clone())
            .or_insert_with(|| DraftOverlay::new(Arc::clone(version))))
    }
}

/// Versions and drafts held in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a version
    ///
    /// # Errors
    /// Returns a conflict if a version with the same id exists
    pub fn with_version(self, version: AnalysisVersion) -> Result<Self, StoreError> {
        self.insert_version(version)?;
        Ok(self)
    }

    /// Register a committed version
    ///
    /// # Errors
    /// Returns a conflict if a version with the same id exists
    pub fn insert_version(&self, version: AnalysisVersion) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.versions.contains_key(version.id()) {
            return Err(StoreError::Conflict(format!("version {} already exists", version.id())));
        }
        state.versions.insert(version.id().clone(), Arc::new(version));
        Ok(())
    }

    /// Simulate a lost connection; every call fails with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Make the next commit fail with `error`
    pub fn fail_next_commit(&self, error: StoreError) {
        self.state.lock().fail_next_commit = Some(error);
    }

    /// Commit requests received, successful or not
    #[must_use]
    pub fn commit_calls(&self) -> u64 {
        self.state.lock().commit_calls
    }

    #[must_use]
    pub fn version_count(&self) -> usize {
        self.state.lock().versions.len()
    }

    /// Changes currently staged on a version
    #[must_use]
    pub fn staged_count(&self, version_id: &VersionId) -> usize {
        self.state.lock().drafts.get(version_id).map_or(0, DraftOverlay::len)
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get_version(&self, id: &VersionId) -> Result<AnalysisVersion, StoreError> {
        let state = self.state.lock();
        state.check_online()?;
        state.version(id).map(|version| AnalysisVersion::clone(version))
    }

    async fn get_draft(&self, version_id: &VersionId) -> Result<DraftSnapshot, StoreError> {
        let state = self.state.lock();
        state.check_online()?;
        let base = AnalysisVersion::clone(state.version(version_id)?);
        let changes = state
            .drafts
            .get(version_id)
            .map(|draft| draft.changes().cloned().collect())
            .unwrap_or_default();
        Ok(DraftSnapshot { base, changes })
    }

    async fn stage_add(
        &self,
        version_id: &VersionId,
        id: &FindingId,
        scope_id: &ScopeId,
        payload: &FindingPayload,
    ) -> Result<DraftChange, StoreError> {
        let mut state = self.state.lock();
        let draft = state.draft_mut(version_id)?;
        let change = DraftChange::Add {
            id: id.clone(),
            scope_id: scope_id.clone(),
            payload: payload.clone(),
        };
        draft.check(&change)?;
        draft.apply(change.clone());
        Ok(change)
    }

    async fn stage_update(
        &self,
        version_id: &VersionId,
        finding_id: &FindingId,
        payload: &FindingPayload,
    ) -> Result<DraftChange, StoreError> {
        let mut state = self.state.lock();
        let draft = state.draft_mut(version_id)?;
        Ok(draft.stage_replace(finding_id, payload.clone())?)
    }

    async fn stage_delete(
        &self,
        version_id: &VersionId,
        finding_id: &FindingId,
    ) -> Result<Option<DraftChange>, StoreError> {
        let mut state = self.state.lock();
        let draft = state.draft_mut(version_id)?;
        match draft.stage_delete(finding_id)? {
            DeleteOutcome::Staged(change) => Ok(Some(change)),
            DeleteOutcome::Discarded(_) => Ok(None),
        }
    }

    async fn commit(&self, version_id: &VersionId) -> Result<CommitReceipt, StoreError> {
        let mut state = self.state.lock();
        state.commit_calls += 1;
        state.check_online()?;
        if let Some(error) = state.fail_next_commit.take() {
            return Err(error);
        }

        let draft = match state.drafts.get(version_id) {
            Some(draft) if !draft.is_empty() => draft,
            _ => {
                state.version(version_id)?;
                return Err(StoreError::Conflict(format!("no staged changes on {version_id}")));
            }
        };

        let base = draft.base();
        let new_version_id = VersionId::generate();
        let version = AnalysisVersion::builder(new_version_id.clone(), base.code_version_id().clone())
            .parent(base.id().clone())
            .scope_strategy(base.scope_strategy())
            .status(base.status())
            .scopes(base.scopes().iter().cloned())
            .findings(draft.merged_view().into_findings())
            .build()
            .map_err(StoreError::Integrity)?;

        tracing::info!(
            parent = %version_id,
            version = %new_version_id,
            changes = draft.len(),
            findings = version.findings().len(),
            "draft committed"
        );

        state.drafts.remove(version_id);
        state.versions.insert(new_version_id.clone(), Arc::new(version));

        Ok(CommitReceipt {
            new_version_id,
            parent_version_id: version_id.clone(),
        })
    }

    async fn undo_staged(&self, version_id: &VersionId, change_id: &FindingId) -> Result<UndoReceipt, StoreError> {
        let mut state = self.state.lock();
        let draft = state.draft_mut(version_id)?;
        let receipt = match draft.undo(change_id) {
            None => UndoReceipt::NothingStaged,
            Some(DraftChange::Add { id, .. }) => UndoReceipt::Removed { id },
            Some(_) => match draft.base().finding(change_id) {
                Some(finding) => UndoReceipt::Restored {
                    finding: finding.clone(),
                },
                None => UndoReceipt::NothingStaged,
            },
        };
        Ok(receipt)
    }
}
