//! Draft overlay over an immutable base version
//!
//! [`DraftOverlay`] holds the staged edits one reviewer made against one base
//! version. Staging never touches the base; [`DraftOverlay::merged_view`]
//! computes what a commit would produce.
//!
//! Each edit is split into a `plan_*` step that validates and builds the
//! [`DraftChange`] without mutating, and an apply step. Callers that must
//! confirm with a backing store first plan, send, then apply.

use crate::change::DraftChange;
use crate::error::{DraftError, EntityKind};
use crate::view::{DecoratedFinding, DraftStatus, MergedView, ScopeView};
use audit_model::{
    AnalysisVersion, Finding, FindingId, FindingPatch, FindingPayload, ModelError, Review, ScopeId,
    ValidationError, VersionId,
};
use indexmap::IndexMap;
use std::sync::Arc;

/// Result of staging a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A delete was recorded against a base finding
    Staged(DraftChange),
    /// The target was a staged addition; it was dropped, nothing recorded
    Discarded(DraftChange),
}

impl DeleteOutcome {
    #[inline]
    #[must_use]
    pub fn change(&self) -> &DraftChange {
        match self {
            Self::Staged(change) | Self::Discarded(change) => change,
        }
    }
}

/// Staged edits against one base version
///
/// # Invariants
/// - At most one change per finding id; a later edit replaces the earlier one
/// - The base version is never mutated
/// - Change order is staging order, kept stable across replacements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOverlay {
    base: Arc<AnalysisVersion>,
    changes: IndexMap<FindingId, DraftChange>,
}

impl DraftOverlay {
    /// Empty overlay on `base`
    #[must_use]
    pub fn new(base: impl Into<Arc<AnalysisVersion>>) -> Self {
        Self {
            base: base.into(),
            changes: IndexMap::new(),
        }
    }

    /// Rebuild an overlay from persisted changes
    ///
    /// # Errors
    /// Returns [`DraftError::NotFound`] when a change targets a scope or
    /// finding the base no longer has. Stale drafts are surfaced, not merged.
    pub fn from_snapshot(
        base: impl Into<Arc<AnalysisVersion>>,
        changes: impl IntoIterator<Item = DraftChange>,
    ) -> Result<Self, DraftError> {
        let mut overlay = Self::new(base);
        for change in changes {
            overlay.check(&change)?;
            overlay.apply(change);
        }
        Ok(overlay)
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> &AnalysisVersion {
        &self.base
    }

    #[inline]
    #[must_use]
    pub fn base_arc(&self) -> &Arc<AnalysisVersion> {
        &self.base
    }

    #[inline]
    #[must_use]
    pub fn base_version_id(&self) -> &VersionId {
        self.base.id()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Staged changes in staging order
    pub fn changes(&self) -> impl Iterator<Item = &DraftChange> {
        self.changes.values()
    }

    #[must_use]
    pub fn change(&self, id: &FindingId) -> Option<&DraftChange> {
        self.changes.get(id)
    }

    #[must_use]
    pub fn into_changes(self) -> Vec<DraftChange> {
        self.changes.into_values().collect()
    }

    /// Build an addition without staging it
    ///
    /// # Errors
    /// Unknown scope or invalid payload
    pub fn plan_add(&self, scope_id: ScopeId, payload: FindingPayload) -> Result<DraftChange, DraftError> {
        self.check_add(&scope_id, &payload)?;
        Ok(DraftChange::Add {
            id: FindingId::generate(),
            scope_id,
            payload,
        })
    }

    /// Build an update from a partial edit of the visible payload
    ///
    /// # Errors
    /// Empty patch, unknown finding, or a patched payload that fails validation
    pub fn plan_update(&self, finding_id: &FindingId, patch: &FindingPatch) -> Result<DraftChange, DraftError> {
        if patch.is_empty() {
            return Err(ValidationError::field("patch", "is empty").into());
        }
        let current = self.visible_payload(finding_id)?;
        self.plan_replace(finding_id, patch.apply_to(current))
    }

    /// Build an update carrying a full replacement payload
    ///
    /// Editing a staged addition keeps it an addition.
    ///
    /// # Errors
    /// Unknown finding or invalid payload
    pub fn plan_replace(&self, finding_id: &FindingId, payload: FindingPayload) -> Result<DraftChange, DraftError> {
        payload.validate()?;
        match self.changes.get(finding_id) {
            Some(DraftChange::Add { id, scope_id, .. }) => Ok(DraftChange::Add {
                id: id.clone(),
                scope_id: scope_id.clone(),
                payload,
            }),
            _ => {
                self.require_base_finding(finding_id)?;
                Ok(DraftChange::Update {
                    base_finding_id: finding_id.clone(),
                    payload,
                })
            }
        }
    }

    /// Decide what deleting `finding_id` means without staging it
    ///
    /// # Errors
    /// Unknown finding
    pub fn plan_delete(&self, finding_id: &FindingId) -> Result<DeleteOutcome, DraftError> {
        match self.changes.get(finding_id) {
            Some(add @ DraftChange::Add { .. }) => Ok(DeleteOutcome::Discarded(add.clone())),
            _ => {
                self.require_base_finding(finding_id)?;
                Ok(DeleteOutcome::Staged(DraftChange::Delete {
                    base_finding_id: finding_id.clone(),
                }))
            }
        }
    }

    /// Stage a new finding in a base scope
    ///
    /// # Errors
    /// See [`Self::plan_add`]
    pub fn stage_add(&mut self, scope_id: ScopeId, payload: FindingPayload) -> Result<DraftChange, DraftError> {
        let change = self.plan_add(scope_id, payload)?;
        self.apply(change.clone());
        Ok(change)
    }

    /// Stage a partial edit
    ///
    /// # Errors
    /// See [`Self::plan_update`]
    pub fn stage_update(&mut self, finding_id: &FindingId, patch: &FindingPatch) -> Result<DraftChange, DraftError> {
        let change = self.plan_update(finding_id, patch)?;
        self.apply(change.clone());
        Ok(change)
    }

    /// Stage a full replacement payload
    ///
    /// # Errors
    /// See [`Self::plan_replace`]
    pub fn stage_replace(&mut self, finding_id: &FindingId, payload: FindingPayload) -> Result<DraftChange, DraftError> {
        let change = self.plan_replace(finding_id, payload)?;
        self.apply(change.clone());
        Ok(change)
    }

    /// Stage reviewer feedback and verdict for a finding
    ///
    /// # Errors
    /// See [`Self::plan_update`]
    pub fn stage_review(&mut self, finding_id: &FindingId, review: Review) -> Result<DraftChange, DraftError> {
        self.stage_update(finding_id, &FindingPatch::new().review(review))
    }

    /// Stage a deletion
    ///
    /// Deleting a staged addition removes it outright.
    ///
    /// # Errors
    /// See [`Self::plan_delete`]
    pub fn stage_delete(&mut self, finding_id: &FindingId) -> Result<DeleteOutcome, DraftError> {
        let outcome = self.plan_delete(finding_id)?;
        self.resolve(&outcome);
        Ok(outcome)
    }

    /// Drop the staged change for `change_id`, restoring the base view of it
    ///
    /// Idempotent: returns `None` when nothing was staged.
    pub fn undo(&mut self, change_id: &FindingId) -> Option<DraftChange> {
        let removed = self.changes.shift_remove(change_id);
        if let Some(change) = &removed {
            tracing::debug!(base_version = %self.base.id(), change = %change, "draft change undone");
        }
        removed
    }

    /// Record a planned change, replacing any earlier change for the same id
    pub(crate) fn apply(&mut self, change: DraftChange) -> Option<DraftChange> {
        tracing::debug!(base_version = %self.base.id(), change = %change, "draft change staged");
        self.changes.insert(change.id().clone(), change)
    }

    /// Record a planned delete outcome
    pub(crate) fn resolve(&mut self, outcome: &DeleteOutcome) {
        match outcome {
            DeleteOutcome::Staged(change) => {
                self.apply(change.clone());
            }
            DeleteOutcome::Discarded(change) => {
                self.undo(change.id());
            }
        }
    }

    /// Base version with staged changes applied
    ///
    /// Pure: equal overlays give equal views.
    #[must_use]
    pub fn merged_view(&self) -> MergedView {
        let mut pending_deletions = Vec::new();
        let scopes = self
            .base
            .scopes()
            .iter()
            .map(|scope| {
                let mut findings = Vec::new();
                for finding in self.base.findings_for(&scope.id) {
                    match self.changes.get(&finding.id) {
                        None => findings.push(DecoratedFinding {
                            finding: finding.clone(),
                            draft_status: DraftStatus::Committed,
                        }),
                        Some(DraftChange::Delete { .. }) => pending_deletions.push(finding.clone()),
                        Some(change) => {
                            let payload = change.payload().unwrap_or(&finding.payload).clone();
                            findings.push(DecoratedFinding {
                                finding: Finding::new(finding.id.clone(), scope.id.clone(), payload),
                                draft_status: DraftStatus::Modified,
                            });
                        }
                    }
                }

                for change in self.changes.values() {
                    if let DraftChange::Add { id, scope_id, payload } = change {
                        if scope_id == &scope.id {
                            findings.push(DecoratedFinding {
                                finding: Finding::new(id.clone(), scope_id.clone(), payload.clone()),
                                draft_status: DraftStatus::New,
                            });
                        }
                    }
                }

                ScopeView {
                    scope: scope.clone(),
                    findings,
                }
            })
            .collect();

        MergedView {
            base_version_id: self.base.id().clone(),
            scopes,
            pending_deletions,
        }
    }

    fn visible_payload(&self, finding_id: &FindingId) -> Result<&FindingPayload, DraftError> {
        if let Some(payload) = self.changes.get(finding_id).and_then(DraftChange::payload) {
            return Ok(payload);
        }
        self.require_base_finding(finding_id).map(|finding| &finding.payload)
    }

    pub(crate) fn check_add(&self, scope_id: &ScopeId, payload: &FindingPayload) -> Result<(), DraftError> {
        self.require_scope(scope_id)?;
        payload.validate()?;
        Ok(())
    }

    fn require_scope(&self, scope_id: &ScopeId) -> Result<(), DraftError> {
        if self.base.contains_scope(scope_id) {
            Ok(())
        } else {
            Err(DraftError::not_found(EntityKind::Scope, scope_id))
        }
    }

    fn require_base_finding(&self, finding_id: &FindingId) -> Result<&Finding, DraftError> {
        self.base
            .finding(finding_id)
            .ok_or_else(|| DraftError::not_found(EntityKind::Finding, finding_id))
    }

    pub(crate) fn check(&self, change: &DraftChange) -> Result<(), DraftError> {
        match change {
            DraftChange::Add { id, scope_id, payload } => {
                self.require_scope(scope_id)?;
                if self.base.finding(id).is_some() {
                    return Err(DraftError::Integrity(ModelError::DuplicateFinding(id.clone())));
                }
                payload.validate()?;
            }
            DraftChange::Update {
                base_finding_id,
                payload,
            } => {
                self.require_base_finding(base_finding_id)?;
                payload.validate()?;
            }
            DraftChange::Delete { base_finding_id } => {
                self.require_base_finding(base_finding_id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::DraftKind;
    use audit_model::{Severity, Verdict};
    use audit_test_utils::{payload, scenario_base_version, BASE_SCOPE, SECOND_SCOPE};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn overlay() -> DraftOverlay {
        DraftOverlay::new(scenario_base_version())
    }

    fn id(raw: &str) -> FindingId {
        FindingId::new(raw)
    }

    #[test]
    fn add_then_undo_restores_view() {
        let mut overlay = overlay();
        let before = overlay.merged_view();

        let change = overlay
            .stage_add(ScopeId::new(BASE_SCOPE), payload("f3", Severity::Medium))
            .unwrap();
        assert_eq!(overlay.merged_view().summary().added, 1);

        assert_eq!(overlay.undo(change.id()), Some(change));
        assert_eq!(overlay.merged_view(), before);
    }

    #[test]
    fn update_then_undo_restores_base_fields() {
        let mut overlay = overlay();
        let original = overlay.base().finding(&id("f1")).unwrap().clone();

        overlay
            .stage_update(&id("f1"), &FindingPatch::new().level(Severity::High))
            .unwrap();
        let modified = overlay.merged_view().finding(&id("f1")).cloned().unwrap();
        assert_eq!(modified.draft_status, DraftStatus::Modified);
        assert_eq!(modified.finding.level(), Severity::High);

        overlay.undo(&id("f1"));
        let restored = overlay.merged_view().finding(&id("f1")).cloned().unwrap();
        assert_eq!(restored.draft_status, DraftStatus::Committed);
        assert_eq!(restored.finding, original);
    }

    #[test]
    fn second_update_replaces_first() {
        let mut overlay = overlay();
        overlay
            .stage_update(&id("f1"), &FindingPatch::new().level(Severity::High))
            .unwrap();
        overlay
            .stage_update(&id("f1"), &FindingPatch::new().name("Renamed"))
            .unwrap();

        assert_eq!(overlay.len(), 1);
        let payload = overlay.change(&id("f1")).and_then(DraftChange::payload).unwrap();
        assert_eq!(payload.level, Severity::High);
        assert_eq!(payload.name, "Renamed");
    }

    #[test]
    fn editing_a_staged_add_keeps_it_an_add() {
        let mut overlay = overlay();
        let add = overlay
            .stage_add(ScopeId::new(SECOND_SCOPE), payload("f3", Severity::Low))
            .unwrap();

        let edited = overlay
            .stage_update(add.id(), &FindingPatch::new().level(Severity::Critical))
            .unwrap();
        assert_eq!(edited.kind(), DraftKind::Add);
        assert_eq!(overlay.len(), 1);
        assert_eq!(
            overlay.merged_view().finding(add.id()).unwrap().draft_status,
            DraftStatus::New
        );
    }

    #[test]
    fn delete_of_staged_add_leaves_no_record() {
        let mut overlay = overlay();
        let add = overlay
            .stage_add(ScopeId::new(BASE_SCOPE), payload("f3", Severity::Medium))
            .unwrap();

        let outcome = overlay.stage_delete(add.id()).unwrap();
        assert!(matches!(outcome, DeleteOutcome::Discarded(_)));
        assert!(overlay.is_empty());
        assert!(overlay.changes().all(|c| c.kind() != DraftKind::Delete));
    }

    #[test]
    fn delete_of_base_finding_hides_it() {
        let mut overlay = overlay();
        overlay
            .stage_update(&id("f2"), &FindingPatch::new().name("edited first"))
            .unwrap();

        let outcome = overlay.stage_delete(&id("f2")).unwrap();
        assert!(matches!(outcome, DeleteOutcome::Staged(_)));

        let deletes: Vec<_> = overlay.changes().filter(|c| c.kind() == DraftKind::Delete).collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(overlay.len(), 1);

        let view = overlay.merged_view();
        assert!(view.finding(&id("f2")).is_none());
        assert!(view.is_deleted(&id("f2")));
    }

    #[test]
    fn unknown_targets_are_not_found() {
        let mut overlay = overlay();

        let err = overlay
            .stage_add(ScopeId::new("s-missing"), payload("f3", Severity::Low))
            .unwrap_err();
        assert!(matches!(err, DraftError::NotFound { kind: EntityKind::Scope, .. }));

        let err = overlay
            .stage_update(&id("f9"), &FindingPatch::new().level(Severity::Low))
            .unwrap_err();
        assert!(matches!(err, DraftError::NotFound { kind: EntityKind::Finding, .. }));

        assert!(overlay.stage_delete(&id("f9")).unwrap_err().is_fatal());
        assert!(overlay.is_empty());
    }

    #[test]
    fn invalid_payload_is_rejected_before_staging() {
        let mut overlay = overlay();
        let mut bad = payload("f3", Severity::Low);
        bad.name = "  ".to_string();
        bad.reference = String::new();

        let err = overlay.stage_add(ScopeId::new(BASE_SCOPE), bad).unwrap_err();
        match err {
            DraftError::Validation(v) => {
                assert!(v.mentions("name"));
                assert!(v.mentions("reference"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(overlay.is_empty());

        let err = overlay.stage_update(&id("f1"), &FindingPatch::new()).unwrap_err();
        assert!(matches!(err, DraftError::Validation(_)));
    }

    #[test]
    fn review_is_staged_as_update() {
        let mut overlay = overlay();
        let at = chrono::Utc::now();
        let review = Review {
            feedback: Some("confirmed on mainnet fork".to_string()),
            verdict: Some(Verdict::Validated(at)),
        };

        let change = overlay.stage_review(&id("f1"), review.clone()).unwrap();
        assert_eq!(change.kind(), DraftKind::Update);
        assert_eq!(change.payload().unwrap().review, review);
        assert_eq!(change.payload().unwrap().level, Severity::Critical);
    }

    #[test]
    fn undo_is_idempotent() {
        let mut overlay = overlay();
        overlay.stage_delete(&id("f1")).unwrap();
        assert!(overlay.undo(&id("f1")).is_some());
        assert!(overlay.undo(&id("f1")).is_none());
    }

    #[test]
    fn from_snapshot_rejects_stale_changes() {
        let stale = DraftChange::Update {
            base_finding_id: id("f-gone"),
            payload: payload("f-gone", Severity::Low),
        };
        let err = DraftOverlay::from_snapshot(scenario_base_version(), [stale]).unwrap_err();
        assert!(matches!(err, DraftError::NotFound { kind: EntityKind::Finding, .. }));

        let rekeyed = DraftChange::Add {
            id: FindingId::generate(),
            scope_id: ScopeId::new("s-rekeyed"),
            payload: payload("f3", Severity::Low),
        };
        let err = DraftOverlay::from_snapshot(scenario_base_version(), [rekeyed]).unwrap_err();
        assert!(matches!(err, DraftError::NotFound { kind: EntityKind::Scope, .. }));
    }

    #[test]
    fn from_snapshot_rejects_add_colliding_with_base() {
        let colliding = DraftChange::Add {
            id: id("f1"),
            scope_id: ScopeId::new(BASE_SCOPE),
            payload: payload("f1", Severity::Low),
        };
        let err = DraftOverlay::from_snapshot(scenario_base_version(), [colliding]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(bool, Severity),
        Update(u8, Severity),
        Delete(u8),
        Undo(u8),
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Critical),
            Just(Severity::High),
            Just(Severity::Medium),
            Just(Severity::Low),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), severity()).prop_map(|(first, level)| Op::Add(first, level)),
            (0u8..4, severity()).prop_map(|(target, level)| Op::Update(target, level)),
            (0u8..4).prop_map(Op::Delete),
            (0u8..4).prop_map(Op::Undo),
        ]
    }

    /// Targets: the two base findings plus whatever was added so far
    fn target(overlay: &DraftOverlay, index: u8) -> FindingId {
        let mut ids = vec![id("f1"), id("f2")];
        ids.extend(
            overlay
                .changes()
                .filter(|c| c.kind() == DraftKind::Add)
                .map(|c| c.id().clone()),
        );
        ids[usize::from(index) % ids.len()].clone()
    }

    proptest! {
        #[test]
        fn merged_view_is_pure_and_base_is_untouched(ops in prop::collection::vec(op(), 0..16)) {
            let base = scenario_base_version();
            let mut overlay = DraftOverlay::new(base.clone());

            for op in ops {
                let _ = match op {
                    Op::Add(first, level) => {
                        let scope = if first { BASE_SCOPE } else { SECOND_SCOPE };
                        overlay.stage_add(ScopeId::new(scope), payload("added", level)).map(|_| ())
                    }
                    Op::Update(i, level) => {
                        let target = target(&overlay, i);
                        overlay.stage_update(&target, &FindingPatch::new().level(level)).map(|_| ())
                    }
                    Op::Delete(i) => {
                        let target = target(&overlay, i);
                        overlay.stage_delete(&target).map(|_| ())
                    }
                    Op::Undo(i) => {
                        let target = target(&overlay, i);
                        overlay.undo(&target);
                        Ok(())
                    }
                };
            }

            let first = overlay.merged_view();
            let second = overlay.merged_view();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(overlay.base(), &base);

            let summary = first.summary();
            prop_assert_eq!(summary.committed + summary.modified + summary.deleted, 2);
            prop_assert_eq!(summary.modified + summary.added + summary.deleted, overlay.len());
        }
    }
}
