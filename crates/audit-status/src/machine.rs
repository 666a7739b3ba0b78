//! Per-scope status machine
//!
//! `waiting -> processing -> {success, failed, partial}`. Backward moves are
//! re-runs and are accepted; the machine never rejects an event.

use audit_model::{AnalysisStatus, ScopeId};

/// How a scope moved between two states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// Forward between non-terminal states (`waiting -> processing`)
    Advance,
    /// Non-terminal to terminal
    Complete,
    /// Terminal to a different terminal state (re-run result)
    Revise,
    /// Terminal back to non-terminal (re-analysis started)
    Reset,
    /// `processing -> waiting`
    Requeue,
    /// Same status, new finding count
    Recount,
    /// Same status and count; a duplicate delivery
    Unchanged,
}

/// Classify a status change, ignoring finding counts
#[must_use]
pub fn classify(from: AnalysisStatus, to: AnalysisStatus) -> TransitionKind {
    if from == to {
        return TransitionKind::Unchanged;
    }
    match (from.is_terminal(), to.is_terminal()) {
        (false, false) if to == AnalysisStatus::Processing => TransitionKind::Advance,
        (false, false) => TransitionKind::Requeue,
        (false, true) => TransitionKind::Complete,
        (true, false) => TransitionKind::Reset,
        (true, true) => TransitionKind::Revise,
    }
}

/// Result of feeding one event to a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub scope_id: ScopeId,
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
    pub kind: TransitionKind,
}

impl Transition {
    /// Whether the machine's state changed
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.kind != TransitionKind::Unchanged
    }
}

/// State of one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStatusMachine {
    scope_id: ScopeId,
    status: AnalysisStatus,
    finding_count: Option<u32>,
    transitions: u64,
}

impl ScopeStatusMachine {
    #[inline]
    #[must_use]
    pub fn new(scope_id: ScopeId, status: AnalysisStatus) -> Self {
        Self {
            scope_id,
            status,
            finding_count: None,
            transitions: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    /// Last reported finding count, cleared on reset
    #[inline]
    #[must_use]
    pub fn finding_count(&self) -> Option<u32> {
        self.finding_count
    }

    /// Number of accepted transitions so far
    #[inline]
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Apply an inbound status
    pub fn apply(&mut self, status: AnalysisStatus, finding_count: Option<u32>) -> Transition {
        let from = self.status;
        let mut kind = classify(from, status);

        if kind == TransitionKind::Unchanged
            && finding_count.is_some()
            && finding_count != self.finding_count
        {
            kind = TransitionKind::Recount;
        }

        if kind != TransitionKind::Unchanged {
            if kind == TransitionKind::Reset {
                self.finding_count = None;
            }
            if finding_count.is_some() {
                self.finding_count = finding_count;
            }
            self.status = status;
            self.transitions += 1;
        }

        Transition {
            scope_id: self.scope_id.clone(),
            from,
            to: status,
            kind,
        }
    }
}
