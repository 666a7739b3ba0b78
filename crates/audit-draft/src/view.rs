//! Merged read model
//!
//! A [`MergedView`] is the base version with a draft laid over it, every
//! finding decorated with where it came from.

use audit_model::{Finding, FindingId, Scope, SeverityCounts, VersionId};
use serde::Serialize;

/// Provenance of a finding in a merged view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    /// Unchanged from the base version
    Committed,
    /// Base finding with a staged update
    Modified,
    /// Staged addition
    New,
}

/// Finding as presented in a merged view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoratedFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub draft_status: DraftStatus,
}

/// One scope with its visible findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeView {
    pub scope: Scope,
    pub findings: Vec<DecoratedFinding>,
}

/// Change totals for a merged view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewSummary {
    pub committed: usize,
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
}

impl ViewSummary {
    /// Whether anything is staged
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.modified + self.added + self.deleted > 0
    }
}

/// Base version with a draft applied
///
/// Scopes appear in base order. Within a scope, base findings keep base
/// order and staged additions follow in staging order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedView {
    pub base_version_id: VersionId,
    pub scopes: Vec<ScopeView>,
    /// Base findings hidden by a staged deletion
    pub pending_deletions: Vec<Finding>,
}

impl MergedView {
    /// Every visible finding, scope by scope
    pub fn findings(&self) -> impl Iterator<Item = &DecoratedFinding> {
        self.scopes.iter().flat_map(|scope| scope.findings.iter())
    }

    #[must_use]
    pub fn finding(&self, id: &FindingId) -> Option<&DecoratedFinding> {
        self.findings().find(|f| &f.finding.id == id)
    }

    #[must_use]
    pub fn scope(&self, scope_id: &audit_model::ScopeId) -> Option<&ScopeView> {
        self.scopes.iter().find(|view| &view.scope.id == scope_id)
    }

    #[must_use]
    pub fn is_deleted(&self, id: &FindingId) -> bool {
        self.pending_deletions.iter().any(|f| &f.id == id)
    }

    /// Visible finding ids in view order
    #[must_use]
    pub fn finding_ids(&self) -> Vec<FindingId> {
        self.findings().map(|f| f.finding.id.clone()).collect()
    }

    #[must_use]
    pub fn summary(&self) -> ViewSummary {
        let mut summary = ViewSummary {
            deleted: self.pending_deletions.len(),
            ..ViewSummary::default()
        };
        for finding in self.findings() {
            match finding.draft_status {
                DraftStatus::Committed => summary.committed += 1,
                DraftStatus::Modified => summary.modified += 1,
                DraftStatus::New => summary.added += 1,
            }
        }
        summary
    }

    /// Severity totals over visible findings
    #[must_use]
    pub fn finding_counts(&self) -> SeverityCounts {
        self.findings().map(|f| &f.finding).collect()
    }

    /// Strip decorations; the finding set a commit of this draft produces
    #[must_use]
    pub fn into_findings(self) -> Vec<Finding> {
        self.scopes
            .into_iter()
            .flat_map(|scope| scope.findings)
            .map(|decorated| decorated.finding)
            .collect()
    }
}
