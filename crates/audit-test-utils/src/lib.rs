//! Testing utilities for the audit workspace
//!
//! Shared fixtures: scopes, payloads, and the base version used by the
//! draft scenario tests.

#![allow(missing_docs)]

use audit_model::{
    AnalysisStatus, AnalysisVersion, Finding, FindingPayload, Scope, ScopeStrategy, Severity,
};

pub const BASE_VERSION: &str = "v1";
pub const BASE_SCOPE: &str = "s-withdraw";
pub const SECOND_SCOPE: &str = "s-deposit";

pub fn scope(id: &str) -> Scope {
    Scope::new(id, format!("node-{id}"), id, format!("{id}(uint256)"), format!("generic-{id}"))
}

pub fn scope_with_generic(id: &str, generic_id: &str) -> Scope {
    Scope::new(id, format!("node-{id}"), id, format!("{id}(uint256)"), generic_id)
}

pub fn payload(name: &str, level: Severity) -> FindingPayload {
    FindingPayload::new(
        name,
        "reentrancy",
        level,
        format!("{name}: external call before state update"),
        "Apply checks-effects-interactions",
        "SWC-107",
    )
}

pub fn finding(id: &str, scope_id: &str, level: Severity) -> Finding {
    Finding::new(id, scope_id, payload(id, level))
}

/// `v1` with two scopes and findings `[f1: critical, f2: low]`
pub fn scenario_base_version() -> AnalysisVersion {
    AnalysisVersion::builder(BASE_VERSION, "code-1")
        .scope_strategy(ScopeStrategy::All)
        .status(AnalysisStatus::Success)
        .scope(scope(BASE_SCOPE).with_status(AnalysisStatus::Success))
        .scope(scope(SECOND_SCOPE).with_status(AnalysisStatus::Success))
        .finding(finding("f1", BASE_SCOPE, Severity::Critical))
        .finding(finding("f2", SECOND_SCOPE, Severity::Low))
        .build()
        .unwrap()
}

/// A version whose scopes start in the given states
pub fn version_with_scopes(id: &str, scopes: &[(&str, AnalysisStatus)]) -> AnalysisVersion {
    AnalysisVersion::builder(id, "code-1")
        .scopes(scopes.iter().map(|(scope_id, status)| scope(scope_id).with_status(*status)))
        .build()
        .unwrap()
}

/// Every ordering of `items`
pub fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_cover_all_orders() {
        assert_eq!(permutations(&[1, 2, 3]).len(), 6);
        assert_eq!(permutations::<u8>(&[]).len(), 1);
    }

    #[test]
    fn scenario_version_is_consistent() {
        let version = scenario_base_version();
        assert_eq!(version.findings().len(), 2);
        assert_eq!(version.scopes().len(), 2);
    }
}
