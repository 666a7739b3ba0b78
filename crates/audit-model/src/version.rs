//! Analysis versions
//!
//! An [`AnalysisVersion`] is immutable once committed. The only field that
//! changes afterwards is the derived version status, which tracks scope
//! progress while the version is still being analyzed.

use crate::error::ModelError;
use crate::finding::{Finding, SeverityCounts};
use crate::ids::{CodeVersionId, FindingId, ScopeId, VersionId};
use crate::scope::Scope;
use crate::status::AnalysisStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a version's scope set was chosen. Kept for audit, never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeStrategy {
    /// Scopes picked one by one
    Explicit,
    /// Every scope of the code version
    #[default]
    All,
    /// Scopes of the parent version, matched by generic id
    Parent,
}

/// Immutable snapshot of scopes and findings
///
/// # Invariants
/// - Scope ids and finding ids are unique
/// - Every finding's `scope_id` names a scope of this version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VersionRecord")]
pub struct AnalysisVersion {
    id: VersionId,
    parent_version_id: Option<VersionId>,
    code_version_id: CodeVersionId,
    scope_strategy: ScopeStrategy,
    status: AnalysisStatus,
    scopes: Vec<Scope>,
    findings: Vec<Finding>,
}

impl AnalysisVersion {
    /// Start building a version
    #[inline]
    #[must_use]
    pub fn builder(id: impl Into<VersionId>, code_version_id: impl Into<CodeVersionId>) -> VersionBuilder {
        VersionBuilder::new(id.into(), code_version_id.into())
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &VersionId {
        &self.id
    }

    #[inline]
    #[must_use]
    pub fn parent_version_id(&self) -> Option<&VersionId> {
        self.parent_version_id.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn code_version_id(&self) -> &CodeVersionId {
        &self.code_version_id
    }

    #[inline]
    #[must_use]
    pub fn scope_strategy(&self) -> ScopeStrategy {
        self.scope_strategy
    }

    /// Derived version status
    #[inline]
    #[must_use]
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    /// Update the derived status while the version is in flight
    #[inline]
    pub fn set_status(&mut self, status: AnalysisStatus) {
        self.status = status;
    }

    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    #[inline]
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    #[must_use]
    pub fn scope(&self, id: &ScopeId) -> Option<&Scope> {
        self.scopes.iter().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn contains_scope(&self, id: &ScopeId) -> bool {
        self.scope(id).is_some()
    }

    #[must_use]
    pub fn finding(&self, id: &FindingId) -> Option<&Finding> {
        self.findings.iter().find(|f| &f.id == id)
    }

    /// Findings owned by one scope, in version order
    pub fn findings_for<'a>(&'a self, scope_id: &'a ScopeId) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| &f.scope_id == scope_id)
    }

    /// Per-severity totals
    #[must_use]
    pub fn finding_counts(&self) -> SeverityCounts {
        self.findings.iter().collect()
    }

    fn check_integrity(&self) -> Result<(), ModelError> {
        let mut scope_ids = HashSet::with_capacity(self.scopes.len());
        for scope in &self.scopes {
            if !scope_ids.insert(&scope.id) {
                return Err(ModelError::DuplicateScope(scope.id.clone()));
            }
        }

        let mut finding_ids = HashSet::with_capacity(self.findings.len());
        for finding in &self.findings {
            if !finding_ids.insert(&finding.id) {
                return Err(ModelError::DuplicateFinding(finding.id.clone()));
            }
            if !scope_ids.contains(&finding.scope_id) {
                return Err(ModelError::DanglingFinding {
                    finding_id: finding.id.clone(),
                    scope_id: finding.scope_id.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`AnalysisVersion`]
#[derive(Debug, Clone)]
pub struct VersionBuilder {
    id: VersionId,
    parent_version_id: Option<VersionId>,
    code_version_id: CodeVersionId,
    scope_strategy: ScopeStrategy,
    status: AnalysisStatus,
    scopes: Vec<Scope>,
    findings: Vec<Finding>,
}

impl VersionBuilder {
    fn new(id: VersionId, code_version_id: CodeVersionId) -> Self {
        Self {
            id,
            parent_version_id: None,
            code_version_id,
            scope_strategy: ScopeStrategy::default(),
            status: AnalysisStatus::Waiting,
            scopes: Vec::new(),
            findings: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: impl Into<VersionId>) -> Self {
        self.parent_version_id = Some(parent.into());
        self
    }

    #[must_use]
    pub fn scope_strategy(mut self, strategy: ScopeStrategy) -> Self {
        self.scope_strategy = strategy;
        self
    }

    #[must_use]
    pub fn status(mut self, status: AnalysisStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    #[must_use]
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    #[must_use]
    pub fn finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    #[must_use]
    pub fn findings(mut self, findings: impl IntoIterator<Item = Finding>) -> Self {
        self.findings.extend(findings);
        self
    }

    /// Build the version
    ///
    /// # Errors
    /// Returns an integrity error for duplicate ids or findings whose scope is missing
    pub fn build(self) -> Result<AnalysisVersion, ModelError> {
        let version = AnalysisVersion {
            id: self.id,
            parent_version_id: self.parent_version_id,
            code_version_id: self.code_version_id,
            scope_strategy: self.scope_strategy,
            status: self.status,
            scopes: self.scopes,
            findings: self.findings,
        };
        version.check_integrity()?;
        Ok(version)
    }
}

#[derive(Deserialize)]
struct VersionRecord {
    id: VersionId,
    #[serde(default)]
    parent_version_id: Option<VersionId>,
    code_version_id: CodeVersionId,
    #[serde(default)]
    scope_strategy: ScopeStrategy,
    #[serde(default)]
    status: AnalysisStatus,
    #[serde(default)]
    scopes: Vec<Scope>,
    #[serde(default)]
    findings: Vec<Finding>,
}

impl TryFrom<VersionRecord> for AnalysisVersion {
    type Error = ModelError;

    fn try_from(record: VersionRecord) -> Result<Self, Self::Error> {
        let mut builder = AnalysisVersion::builder(record.id, record.code_version_id)
            .scope_strategy(record.scope_strategy)
            .status(record.status)
            .scopes(record.scopes)
            .findings(record.findings);
        if let Some(parent) = record.parent_version_id {
            builder = builder.parent(parent);
        }
        builder.build()
    }
}
