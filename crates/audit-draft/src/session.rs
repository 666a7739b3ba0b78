//! Draft session
//!
//! A [`DraftSession`] is one reviewer's editing session on one base version.
//! Every edit is validated locally, confirmed by the backing store, and only
//! then mirrored in the local overlay, so a failed request leaves the
//! pre-edit state visible.

use crate::cache::{CacheKey, ReadCache};
use crate::change::DraftChange;
use crate::commit::{CommitEngine, CommitOutcome};
use crate::config::SessionConfig;
use crate::error::DraftError;
use crate::graph::VersionGraph;
use crate::overlay::{DeleteOutcome, DraftOverlay};
use crate::store::BackingStore;
use crate::view::MergedView;
use audit_model::{AnalysisVersion, FindingId, FindingPatch, FindingPayload, Review, ScopeId, VersionId};
use std::sync::Arc;

/// Editing session over a base version
#[derive(Debug)]
pub struct DraftSession<S: ?Sized> {
    store: Arc<S>,
    engine: CommitEngine<S>,
    cache: ReadCache,
    overlay: DraftOverlay,
    /// Committed version the session moved onto but has not loaded yet
    pending_base: Option<VersionId>,
}

impl<S: BackingStore + ?Sized> DraftSession<S> {
    /// Open a session on `version_id`, resuming any draft the store holds
    ///
    /// # Errors
    /// Transport failures, an unknown version, or a stored draft that no
    /// longer matches its base
    pub async fn open(
        store: Arc<S>,
        graph: Arc<VersionGraph>,
        config: &SessionConfig,
        version_id: &VersionId,
    ) -> Result<Self, DraftError> {
        let cache = match config.cache_ttl() {
            Some(ttl) => ReadCache::with_ttl(config.cache_capacity, ttl),
            None => ReadCache::new(config.cache_capacity),
        };
        let engine = CommitEngine::new(Arc::clone(&store), graph).with_verify_lineage(config.verify_lineage);
        let overlay = load(store.as_ref(), &cache, engine.graph(), version_id).await?;

        tracing::info!(
            base = %version_id,
            staged = overlay.len(),
            "draft session opened"
        );

        Ok(Self {
            store,
            engine,
            cache,
            overlay,
            pending_base: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn overlay(&self) -> &DraftOverlay {
        &self.overlay
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> &AnalysisVersion {
        self.overlay.base()
    }

    /// Id of the version edits apply to, including a committed version
    /// that is not loaded yet
    #[inline]
    #[must_use]
    pub fn base_version_id(&self) -> &VersionId {
        self.pending_base
            .as_ref()
            .unwrap_or_else(|| self.overlay.base_version_id())
    }

    /// True after a commit whose new version could not be fetched yet
    #[inline]
    #[must_use]
    pub fn has_pending_base(&self) -> bool {
        self.pending_base.is_some()
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<VersionGraph> {
        self.engine.graph()
    }

    /// Merged view of the loaded base and staged changes
    ///
    /// While a committed version is pending this shows the previous base with
    /// nothing staged; [`Self::refresh`] loads the new one.
    #[must_use]
    pub fn merged_view(&self) -> MergedView {
        self.overlay.merged_view()
    }

    /// Read any version through the session cache
    ///
    /// # Errors
    /// Store failures
    pub async fn version(&self, id: &VersionId) -> Result<Arc<AnalysisVersion>, DraftError> {
        let store = self.store.as_ref();
        Ok(self.cache.version_or_fetch(id, || store.get_version(id)).await?)
    }

    /// Reload the draft from the store, dropping local state
    ///
    /// # Errors
    /// See [`Self::open`]
    pub async fn refresh(&mut self) -> Result<(), DraftError> {
        let base_id = self.base_version_id().clone();
        self.cache.apply(&[CacheKey::Draft(base_id.clone())]).await;
        self.overlay = load(self.store.as_ref(), &self.cache, self.engine.graph(), &base_id).await?;
        self.pending_base = None;
        Ok(())
    }

    /// Stage a new finding
    ///
    /// # Errors
    /// Validation and unknown-scope errors before any request; store errors after
    pub async fn stage_add(&mut self, scope_id: ScopeId, payload: FindingPayload) -> Result<DraftChange, DraftError> {
        self.load_pending().await?;
        self.overlay.check_add(&scope_id, &payload)?;
        let id = FindingId::generate();
        self.store
            .stage_add(self.overlay.base_version_id(), &id, &scope_id, &payload)
            .await
            .map_err(|err| self.rejected("add", err.into()))?;
        self.accept(DraftChange::Add { id, scope_id, payload }).await
    }

    /// Stage a partial edit
    ///
    /// # Errors
    /// See [`DraftOverlay::plan_update`]; store errors after
    pub async fn stage_update(&mut self, finding_id: &FindingId, patch: &FindingPatch) -> Result<DraftChange, DraftError> {
        self.load_pending().await?;
        let change = self.overlay.plan_update(finding_id, patch)?;
        self.push_update(change).await
    }

    /// Stage reviewer feedback
    ///
    /// # Errors
    /// See [`Self::stage_update`]
    pub async fn stage_review(&mut self, finding_id: &FindingId, review: Review) -> Result<DraftChange, DraftError> {
        self.stage_update(finding_id, &FindingPatch::new().review(review)).await
    }

    /// Stage a deletion, or drop a staged addition
    ///
    /// # Errors
    /// Unknown finding before any request; store errors after
    pub async fn stage_delete(&mut self, finding_id: &FindingId) -> Result<DeleteOutcome, DraftError> {
        self.load_pending().await?;
        let outcome = self.overlay.plan_delete(finding_id)?;
        self.store
            .stage_delete(self.overlay.base_version_id(), finding_id)
            .await
            .map_err(|err| self.rejected("delete", err.into()))?;
        self.overlay.resolve(&outcome);
        self.invalidate_draft().await;
        Ok(outcome)
    }

    /// Drop a staged change
    ///
    /// Undoing a change that is not staged is a no-op and sends nothing.
    ///
    /// # Errors
    /// Store errors; the change stays staged
    pub async fn undo(&mut self, change_id: &FindingId) -> Result<Option<DraftChange>, DraftError> {
        if self.overlay.change(change_id).is_none() {
            return Ok(None);
        }
        self.store
            .undo_staged(self.overlay.base_version_id(), change_id)
            .await
            .map_err(|err| self.rejected("undo", err.into()))?;
        let undone = self.overlay.undo(change_id);
        self.invalidate_draft().await;
        Ok(undone)
    }

    /// Commit the draft and move the session onto the new version
    ///
    /// On failure the draft stays staged. Dropping the returned future also
    /// leaves the draft in place. Once the store accepts the commit the draft
    /// is gone; if the new version cannot be read back it is loaded on the
    /// next edit or [`Self::refresh`].
    ///
    /// # Errors
    /// [`DraftError::NothingToCommit`], store errors, or a lineage conflict
    pub async fn commit(&mut self) -> Result<CommitOutcome, DraftError> {
        self.load_pending().await?;
        let outcome = self
            .engine
            .commit(self.overlay.clone())
            .await
            .map_err(|rejected| rejected.error)?;

        self.cache.apply(&outcome.invalidations).await;
        let fetched = match &outcome.version {
            Some(version) => Ok(Arc::clone(version)),
            None => self.version(&outcome.new_version_id).await,
        };
        match fetched {
            Ok(version) => {
                self.cache.insert_version(Arc::clone(&version)).await;
                self.overlay = DraftOverlay::new(version);
                self.pending_base = None;
            }
            Err(err) => {
                tracing::warn!(
                    version = %outcome.new_version_id,
                    error = %err,
                    "committed version not loaded; deferring to next use"
                );
                self.overlay = DraftOverlay::new(Arc::clone(self.overlay.base_arc()));
                self.pending_base = Some(outcome.new_version_id.clone());
            }
        }
        Ok(outcome)
    }

    async fn load_pending(&mut self) -> Result<(), DraftError> {
        if self.pending_base.is_some() {
            self.refresh().await?;
        }
        Ok(())
    }

    async fn push_update(&mut self, change: DraftChange) -> Result<DraftChange, DraftError> {
        if let Some(payload) = change.payload() {
            self.store
                .stage_update(self.overlay.base_version_id(), change.id(), payload)
                .await
                .map_err(|err| self.rejected("update", err.into()))?;
        }
        self.accept(change).await
    }

    async fn accept(&mut self, change: DraftChange) -> Result<DraftChange, DraftError> {
        self.overlay.apply(change.clone());
        self.invalidate_draft().await;
        Ok(change)
    }

    async fn invalidate_draft(&self) {
        self.cache
            .apply(&[CacheKey::Draft(self.base_version_id().clone())])
            .await;
    }

    fn rejected(&self, action: &'static str, error: DraftError) -> DraftError {
        tracing::warn!(
            base = %self.base_version_id(),
            action,
            error = %error,
            "staged edit rejected by store"
        );
        error
    }
}

async fn load<S: BackingStore + ?Sized>(
    store: &S,
    cache: &ReadCache,
    graph: &VersionGraph,
    version_id: &VersionId,
) -> Result<DraftOverlay, DraftError> {
    let snapshot = cache.draft_or_fetch(version_id, || store.get_draft(version_id)).await?;

    let base = match graph.get(version_id) {
        Some(known) if *known == snapshot.base => known,
        _ => Arc::new(snapshot.base.clone()),
    };
    if !graph.contains(version_id) {
        if let Err(err) = graph.insert(Arc::clone(&base)) {
            tracing::warn!(version = %version_id, error = %err, "base version not recorded in graph");
        }
    }
    cache.insert_version(Arc::clone(&base)).await;

    DraftOverlay::from_snapshot(base, snapshot.changes.iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{DraftSnapshot, MockBackingStore};
    use audit_model::Severity;
    use audit_test_utils::{payload, scenario_base_version, BASE_SCOPE, BASE_VERSION};

    fn store_with_empty_draft() -> MockBackingStore {
        let mut store = MockBackingStore::new();
        store.expect_get_draft().returning(|_| {
            Ok(DraftSnapshot {
                base: scenario_base_version(),
                changes: Vec::new(),
            })
        });
        store
    }

    async fn open(store: MockBackingStore) -> DraftSession<MockBackingStore> {
        DraftSession::open(
            Arc::new(store),
            Arc::new(VersionGraph::new()),
            &SessionConfig::default(),
            &VersionId::new(BASE_VERSION),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn add_reaches_the_store_under_the_local_id() {
        let mut store = store_with_empty_draft();
        store
            .expect_stage_add()
            .times(1)
            .returning(|_, id, scope_id, payload| {
                Ok(DraftChange::Add {
                    id: id.clone(),
                    scope_id: scope_id.clone(),
                    payload: payload.clone(),
                })
            });

        let mut session = open(store).await;
        let change = session
            .stage_add(ScopeId::new(BASE_SCOPE), payload("f3", Severity::Medium))
            .await
            .unwrap();
        assert_eq!(session.overlay().change(change.id()), Some(&change));
    }

    #[tokio::test]
    async fn add_rejected_by_store_is_not_staged() {
        let mut store = store_with_empty_draft();
        store
            .expect_stage_add()
            .times(1)
            .returning(|_, _, _, _| Err(StoreError::Transport("connection reset".to_string())));

        let mut session = open(store).await;
        let err = session
            .stage_add(ScopeId::new(BASE_SCOPE), payload("f3", Severity::Medium))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(session.overlay().is_empty());
    }

    #[tokio::test]
    async fn add_to_unknown_scope_sends_nothing() {
        let mut store = store_with_empty_draft();
        store.expect_stage_add().never();

        let mut session = open(store).await;
        let err = session
            .stage_add(ScopeId::new("s-missing"), payload("f3", Severity::Low))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
