//! Commit engine
//!
//! Turns a [`DraftOverlay`] into a new committed version. The backing store
//! is the only source of atomicity; the engine never applies part of a draft.
//!
//! # Flow
//! 1. Reject an empty overlay locally with [`DraftError::NothingToCommit`]
//! 2. Re-validate every staged change against the base
//! 3. Ask the store to commit, once. Failures are never retried here.
//! 4. Check the receipt's parent against the base version
//! 5. Fetch the new version and record it in the [`VersionGraph`]
//! 6. Return the cache keys the commit made stale
//!
//! A rejected commit hands the overlay back inside [`CommitRejected`].

use crate::cache::CacheKey;
use crate::error::DraftError;
use crate::graph::VersionGraph;
use crate::overlay::DraftOverlay;
use crate::store::BackingStore;
use audit_model::{AnalysisVersion, VersionId};
use std::sync::Arc;

/// A successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub new_version_id: VersionId,
    pub parent_version_id: VersionId,
    /// The committed version, when it could be fetched back
    pub version: Option<Arc<AnalysisVersion>>,
    /// Reads made stale by this commit
    pub invalidations: Vec<CacheKey>,
}

/// A commit that did not happen; the overlay is returned unchanged
#[derive(Debug, thiserror::Error)]
#[error("commit rejected: {error}")]
pub struct CommitRejected {
    pub overlay: DraftOverlay,
    #[source]
    pub error: DraftError,
}

impl CommitRejected {
    #[must_use]
    pub fn into_parts(self) -> (DraftOverlay, DraftError) {
        (self.overlay, self.error)
    }
}

/// Submits overlays to a backing store
#[derive(Debug)]
pub struct CommitEngine<S: ?Sized> {
    store: Arc<S>,
    graph: Arc<VersionGraph>,
    verify_lineage: bool,
}

impl<S: ?Sized> Clone for CommitEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            graph: Arc::clone(&self.graph),
            verify_lineage: self.verify_lineage,
        }
    }
}

impl<S: BackingStore + ?Sized> CommitEngine<S> {
    #[must_use]
    pub fn new(store: Arc<S>, graph: Arc<VersionGraph>) -> Self {
        Self {
            store,
            graph,
            verify_lineage: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_verify_lineage(mut self, verify: bool) -> Self {
        self.verify_lineage = verify;
        self
    }

    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<VersionGraph> {
        &self.graph
    }

    /// Commit `overlay` as a child of its base version
    ///
    /// # Errors
    /// [`CommitRejected`] carrying the untouched overlay and the reason
    pub async fn commit(&self, overlay: DraftOverlay) -> Result<CommitOutcome, CommitRejected> {
        if overlay.is_empty() {
            return Err(CommitRejected {
                overlay,
                error: DraftError::NothingToCommit,
            });
        }
        let stale = overlay.changes().find_map(|change| overlay.check(change).err());
        if let Some(error) = stale {
            return Err(CommitRejected { overlay, error });
        }

        let base_id = overlay.base_version_id().clone();
        tracing::info!(base = %base_id, changes = overlay.len(), "committing draft");

        let receipt = match self.store.commit(&base_id).await {
            Ok(receipt) => receipt,
            Err(err) => {
                let error = DraftError::from(err);
                tracing::warn!(base = %base_id, error = %error, "commit failed; draft kept");
                return Err(CommitRejected { overlay, error });
            }
        };

        if self.verify_lineage && receipt.parent_version_id != base_id {
            let error = DraftError::CommitConflict(format!(
                "store committed {} on {}, expected parent {base_id}",
                receipt.new_version_id, receipt.parent_version_id
            ));
            tracing::error!(base = %base_id, error = %error, "commit lineage mismatch");
            return Err(CommitRejected { overlay, error });
        }

        let version = match self.store.get_version(&receipt.new_version_id).await {
            Ok(version) => self.record(version),
            Err(err) => {
                tracing::warn!(
                    version = %receipt.new_version_id,
                    error = %err,
                    "committed version could not be fetched back"
                );
                None
            }
        };

        let invalidations = vec![
            CacheKey::Draft(base_id.clone()),
            CacheKey::Findings(receipt.new_version_id.clone()),
        ];

        tracing::info!(
            base = %base_id,
            version = %receipt.new_version_id,
            "draft committed; overlay discarded"
        );
        drop(overlay);

        Ok(CommitOutcome {
            new_version_id: receipt.new_version_id,
            parent_version_id: receipt.parent_version_id,
            version,
            invalidations,
        })
    }

    fn record(&self, version: AnalysisVersion) -> Option<Arc<AnalysisVersion>> {
        let id = version.id().clone();
        match self.graph.insert(version) {
            Ok(version) => Some(version),
            Err(err) => {
                tracing::warn!(version = %id, error = %err, "committed version not recorded in graph");
                self.graph.get(&id)
            }
        }
    }
}
