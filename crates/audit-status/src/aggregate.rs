//! Version status aggregation
//!
//! Precedence, highest first:
//! 1. any `failed`     -> `failed`
//! 2. any `processing` -> `processing`
//! 3. any `waiting`    -> `waiting`
//! 4. all `success`    -> `success`
//! 5. any `partial`    -> `partial`
//! 6. otherwise the previous version status is kept
//!
//! The fold only looks at the set of current scope states, so the result does
//! not depend on the order events arrived in across scopes.

use crate::event::ScopeStatusEvent;
use crate::machine::{ScopeStatusMachine, Transition};
use audit_model::{AnalysisStatus, AnalysisVersion, ScopeId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fold scope statuses into a version status
///
/// An empty scope set keeps `previous`.
#[must_use]
pub fn aggregate<I>(statuses: I, previous: AnalysisStatus) -> AnalysisStatus
where
    I: IntoIterator<Item = AnalysisStatus>,
{
    let mut seen = 0usize;
    let mut failed = false;
    let mut processing = false;
    let mut waiting = false;
    let mut partial = false;
    let mut all_success = true;

    for status in statuses {
        seen += 1;
        match status {
            AnalysisStatus::Failed => failed = true,
            AnalysisStatus::Processing => processing = true,
            AnalysisStatus::Waiting => waiting = true,
            AnalysisStatus::Partial => partial = true,
            AnalysisStatus::Success => {}
        }
        all_success &= status == AnalysisStatus::Success;
    }

    if seen == 0 {
        previous
    } else if failed {
        AnalysisStatus::Failed
    } else if processing {
        AnalysisStatus::Processing
    } else if waiting {
        AnalysisStatus::Waiting
    } else if all_success {
        AnalysisStatus::Success
    } else if partial {
        AnalysisStatus::Partial
    } else {
        previous
    }
}

/// Why an event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Scope is not tracked by this version (late or foreign event)
    UnknownScope,
    /// Same status and count as the current state
    Duplicate,
}

/// Outcome of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Dropped(DropReason),
    Accepted {
        transition: Transition,
        previous: AnalysisStatus,
        status: AnalysisStatus,
    },
}

impl ApplyOutcome {
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Whether the version-level status moved
    #[must_use]
    pub fn status_changed(&self) -> bool {
        match self {
            Self::Accepted {
                previous, status, ..
            } => previous != status,
            Self::Dropped(_) => false,
        }
    }
}

/// Progress of one scope inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeProgress {
    pub scope_id: ScopeId,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_count: Option<u32>,
}

/// Point-in-time view of a version's status, for observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub version_id: VersionId,
    pub status: AnalysisStatus,
    pub scopes: Vec<ScopeProgress>,
    /// Sum of reported finding counts
    pub finding_total: u64,
    /// False after a transport fault; `status` is then the last known value
    pub connected: bool,
}

/// Tracks every scope of one version and keeps the aggregate current
#[derive(Debug, Clone)]
pub struct VersionStatusAggregator {
    version_id: VersionId,
    machines: BTreeMap<ScopeId, ScopeStatusMachine>,
    status: AnalysisStatus,
}

impl VersionStatusAggregator {
    /// Empty aggregator with a starting version status
    #[inline]
    #[must_use]
    pub fn new(version_id: VersionId, status: AnalysisStatus) -> Self {
        Self {
            version_id,
            machines: BTreeMap::new(),
            status,
        }
    }

    /// Seed from a version's scopes and their stored statuses
    #[must_use]
    pub fn from_version(version: &AnalysisVersion) -> Self {
        let mut aggregator = Self::new(version.id().clone(), version.status());
        for scope in version.scopes() {
            aggregator
                .machines
                .insert(scope.id.clone(), ScopeStatusMachine::new(scope.id.clone(), scope.status));
        }
        aggregator.recompute();
        aggregator
    }

    #[inline]
    #[must_use]
    pub fn version_id(&self) -> &VersionId {
        &self.version_id
    }

    /// Current version status
    #[inline]
    #[must_use]
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    #[must_use]
    pub fn scope_status(&self, scope_id: &ScopeId) -> Option<AnalysisStatus> {
        self.machines.get(scope_id).map(ScopeStatusMachine::status)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Start tracking a scope. Re-tracking a known scope overwrites its state.
    pub fn track(&mut self, scope_id: ScopeId, status: AnalysisStatus) -> AnalysisStatus {
        self.machines
            .insert(scope_id.clone(), ScopeStatusMachine::new(scope_id, status));
        self.recompute()
    }

    /// Stop tracking a scope
    pub fn untrack(&mut self, scope_id: &ScopeId) -> AnalysisStatus {
        if self.machines.remove(scope_id).is_some() {
            self.recompute();
        }
        self.status
    }

    /// Apply one push event
    ///
    /// Events for untracked scopes and exact duplicates are dropped, never errors.
    pub fn apply(&mut self, event: &ScopeStatusEvent) -> ApplyOutcome {
        let Some(machine) = self.machines.get_mut(&event.scope_id) else {
            tracing::debug!(
                version_id = %self.version_id,
                scope_id = %event.scope_id,
                "dropping event for untracked scope"
            );
            return ApplyOutcome::Dropped(DropReason::UnknownScope);
        };

        let transition = machine.apply(event.status, event.finding_count);
        if !transition.is_accepted() {
            tracing::debug!(scope_id = %event.scope_id, status = %event.status, "duplicate status event");
            return ApplyOutcome::Dropped(DropReason::Duplicate);
        }

        tracing::debug!(
            scope_id = %transition.scope_id,
            from = %transition.from,
            to = %transition.to,
            kind = ?transition.kind,
            "scope transition"
        );

        let previous = self.status;
        let status = self.recompute();
        if previous != status {
            tracing::info!(
                version_id = %self.version_id,
                from = %previous,
                to = %status,
                "version status changed"
            );
        }

        ApplyOutcome::Accepted {
            transition,
            previous,
            status,
        }
    }

    /// Copy the aggregate into a version record
    pub fn write_status(&self, version: &mut AnalysisVersion) {
        if version.id() == &self.version_id {
            version.set_status(self.status);
        }
    }

    /// Snapshot for observers
    #[must_use]
    pub fn snapshot(&self, connected: bool) -> StatusSnapshot {
        let scopes: Vec<ScopeProgress> = self
            .machines
            .values()
            .map(|m| ScopeProgress {
                scope_id: m.scope_id().clone(),
                status: m.status(),
                finding_count: m.finding_count(),
            })
            .collect();
        let finding_total = scopes
            .iter()
            .filter_map(|s| s.finding_count)
            .map(u64::from)
            .sum();

        StatusSnapshot {
            version_id: self.version_id.clone(),
            status: self.status,
            scopes,
            finding_total,
            connected,
        }
    }

    fn recompute(&mut self) -> AnalysisStatus {
        self.status = aggregate(self.machines.values().map(ScopeStatusMachine::status), self.status);
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_model::Scope;
    use proptest::prelude::*;
    use AnalysisStatus::{Failed, Partial, Processing, Success, Waiting};

    fn aggregator(scopes: &[&str]) -> VersionStatusAggregator {
        let mut agg = VersionStatusAggregator::new(VersionId::new("v1"), Waiting);
        for id in scopes {
            agg.track(ScopeId::new(*id), Waiting);
        }
        agg
    }

    #[test]
    fn precedence_rules() {
        assert_eq!(aggregate([Success, Failed, Processing], Waiting), Failed);
        assert_eq!(aggregate([Waiting, Processing], Waiting), Processing);
        assert_eq!(aggregate([Waiting, Success], Success), Waiting);
        assert_eq!(aggregate([Success, Success], Waiting), Success);
        assert_eq!(aggregate([Success, Partial], Waiting), Partial);
        assert_eq!(aggregate([Partial], Success), Partial);
    }

    #[test]
    fn empty_set_keeps_previous() {
        assert_eq!(aggregate(std::iter::empty(), Partial), Partial);
        assert_eq!(aggregate(Vec::new(), Processing), Processing);
    }

    #[test]
    fn unknown_scope_is_dropped() {
        let mut agg = aggregator(&["s1"]);
        let outcome = agg.apply(&ScopeStatusEvent::new("ghost", Failed));

        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::UnknownScope));
        assert_eq!(agg.status(), Waiting);
    }

    #[test]
    fn duplicate_is_dropped() {
        let mut agg = aggregator(&["s1"]);
        assert!(agg.apply(&ScopeStatusEvent::new("s1", Processing)).is_accepted());
        assert_eq!(
            agg.apply(&ScopeStatusEvent::new("s1", Processing)),
            ApplyOutcome::Dropped(DropReason::Duplicate)
        );
    }

    #[test]
    fn recomputes_on_every_transition() {
        let mut agg = aggregator(&["s1", "s2"]);

        let outcome = agg.apply(&ScopeStatusEvent::new("s1", Processing));
        assert!(outcome.status_changed());
        assert_eq!(agg.status(), Processing);

        agg.apply(&ScopeStatusEvent::new("s1", Success));
        assert_eq!(agg.status(), Waiting);

        agg.apply(&ScopeStatusEvent::new("s2", Partial).with_finding_count(2));
        assert_eq!(agg.status(), Partial);

        agg.apply(&ScopeStatusEvent::new("s2", Success));
        assert_eq!(agg.status(), Success);
    }

    #[test]
    fn rerun_reopens_version() {
        let mut agg = aggregator(&["s1"]);
        agg.apply(&ScopeStatusEvent::new("s1", Failed));
        assert_eq!(agg.status(), Failed);

        agg.apply(&ScopeStatusEvent::new("s1", Processing));
        assert_eq!(agg.status(), Processing);
    }

    #[test]
    fn seeds_from_version() {
        let version = AnalysisVersion::builder("v9", "c1")
            .scope(Scope::new("a", "n-a", "a", "a()", "g-a").with_status(Success))
            .scope(Scope::new("b", "n-b", "b", "b()", "g-b").with_status(Partial))
            .build()
            .unwrap();

        let agg = VersionStatusAggregator::from_version(&version);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.status(), Partial);
        assert_eq!(agg.scope_status(&ScopeId::new("a")), Some(Success));
    }

    #[test]
    fn snapshot_sums_finding_counts() {
        let mut agg = aggregator(&["s1", "s2"]);
        agg.apply(&ScopeStatusEvent::new("s1", Success).with_finding_count(3));
        agg.apply(&ScopeStatusEvent::new("s2", Success).with_finding_count(4));

        let snapshot = agg.snapshot(true);
        assert_eq!(snapshot.finding_total, 7);
        assert_eq!(snapshot.scopes.len(), 2);
        assert_eq!(snapshot.status, Success);
    }

    fn status_strategy() -> impl Strategy<Value = AnalysisStatus> {
        prop_oneof![
            Just(Waiting),
            Just(Processing),
            Just(Success),
            Just(Failed),
            Just(Partial),
        ]
    }

    proptest! {
        #[test]
        fn prop_final_status_ignores_cross_scope_order(
            statuses in prop::collection::vec(status_strategy(), 1..8),
            seed in any::<u64>(),
        ) {
            let ids: Vec<String> = (0..statuses.len()).map(|i| format!("s{i}")).collect();
            let events: Vec<ScopeStatusEvent> = ids
                .iter()
                .zip(&statuses)
                .map(|(id, status)| ScopeStatusEvent::new(id.as_str(), *status))
                .collect();

            let mut forward = VersionStatusAggregator::new(VersionId::new("v"), Waiting);
            let mut shuffled = VersionStatusAggregator::new(VersionId::new("v"), Waiting);
            for id in &ids {
                forward.track(ScopeId::new(id.as_str()), Waiting);
                shuffled.track(ScopeId::new(id.as_str()), Waiting);
            }

            for event in &events {
                forward.apply(event);
            }

            let mut order: Vec<usize> = (0..events.len()).collect();
            order.sort_by_key(|i| (*i as u64).wrapping_mul(seed | 1).rotate_left(17));
            for i in order {
                shuffled.apply(&events[i]);
            }

            prop_assert_eq!(forward.status(), shuffled.status());
            prop_assert_eq!(forward.status(), aggregate(statuses.iter().copied(), Waiting));
        }

        #[test]
        fn prop_failed_dominates(
            statuses in prop::collection::vec(status_strategy(), 0..8),
        ) {
            let mut with_failure = statuses.clone();
            with_failure.push(Failed);
            prop_assert_eq!(aggregate(with_failure, Success), Failed);
        }
    }
}
