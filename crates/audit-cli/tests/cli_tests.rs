use audit_cli::{load_changes, load_version, merge, parse_events, replay};
use audit_draft::{DraftChange, SessionConfig};
use audit_model::{AnalysisStatus, FindingId, FindingPatch, ScopeId, Severity};
use audit_status::FeedItem;
use audit_test_utils::{payload, scenario_base_version, version_with_scopes, BASE_SCOPE};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_json<T: serde::Serialize>(value: &T) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    serde_json::to_writer(&mut file, value).unwrap();
    file.flush().unwrap();
    file
}

fn scenario_changes() -> Vec<DraftChange> {
    let base = scenario_base_version();
    let f1 = base.finding(&FindingId::new("f1")).unwrap();
    vec![
        DraftChange::Update {
            base_finding_id: f1.id.clone(),
            payload: FindingPatch::new().level(Severity::High).apply_to(&f1.payload),
        },
        DraftChange::Add {
            id: FindingId::new("f3"),
            scope_id: ScopeId::new(BASE_SCOPE),
            payload: payload("f3", Severity::Medium),
        },
        DraftChange::Delete {
            base_finding_id: FindingId::new("f2"),
        },
    ]
}

#[test]
fn test_malformed_event_lines_become_faults() {
    let raw = r#"{"scope_id":"a","status":"processing"}

{"scope_id":"a","status":"exploded"}
{"scope_id":"a","status":"success","finding_count":2,"extra":true}
"#;
    let items = parse_events(raw);
    assert_eq!(items.len(), 3);
    assert!(matches!(items[0], FeedItem::Event(_)));
    assert!(matches!(&items[1], FeedItem::Fault(reason) if reason.starts_with("line 3")));
    assert!(matches!(items[2], FeedItem::Event(_)));
}

#[tokio::test]
async fn test_replay_folds_stream() {
    let version = version_with_scopes("v1", &[("a", AnalysisStatus::Waiting), ("b", AnalysisStatus::Waiting)]);
    let raw = [
        r#"{"scope_id":"b","status":"processing"}"#,
        r#"{"scope_id":"a","status":"success","finding_count":1}"#,
        r#"{"scope_id":"b","status":"failed","finding_count":3}"#,
        r#"{"scope_id":"zz","status":"success"}"#,
    ]
    .join("\n");

    let report = replay(&version, parse_events(&raw), 2).await.unwrap();
    assert_eq!(report.snapshot.status, AnalysisStatus::Failed);
    assert_eq!(report.snapshot.finding_total, 4);
    assert!(report.snapshot.connected);
    assert_eq!((report.events, report.faults), (4, 0));
}

#[tokio::test]
async fn test_replay_ending_on_fault_keeps_last_status() {
    let version = version_with_scopes("v1", &[("a", AnalysisStatus::Waiting)]);
    let raw = "{\"scope_id\":\"a\",\"status\":\"processing\"}\nnot json\n";

    let report = replay(&version, parse_events(raw), 4).await.unwrap();
    assert_eq!(report.snapshot.status, AnalysisStatus::Processing);
    assert!(!report.snapshot.connected);
    assert_eq!(report.faults, 1);
}

#[tokio::test]
async fn test_merge_preview_and_commit_from_files() {
    let version_file = write_json(&scenario_base_version());
    let draft_file = write_json(&scenario_changes());

    let version = load_version(version_file.path()).unwrap();
    let changes = load_changes(draft_file.path()).unwrap();
    assert_eq!(changes, scenario_changes());

    let preview = merge(version.clone(), changes.clone(), &SessionConfig::default(), false)
        .await
        .unwrap();
    assert!(preview.committed.is_none());
    assert_eq!(preview.view.finding_ids(), vec![FindingId::new("f1"), FindingId::new("f3")]);

    let report = merge(version, changes, &SessionConfig::default(), true).await.unwrap();
    let committed = report.committed.unwrap();
    assert_eq!(committed.parent_version_id().map(|id| id.as_str()), Some("v1"));
    assert_eq!(committed.findings(), report.view.into_findings().as_slice());
}

#[tokio::test]
async fn test_merge_rejects_stale_draft() {
    let stale = vec![DraftChange::Delete {
        base_finding_id: FindingId::new("f-gone"),
    }];
    let err = merge(scenario_base_version(), stale, &SessionConfig::default(), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not apply"));
}

#[tokio::test]
async fn test_empty_draft_cannot_be_committed() {
    let err = merge(scenario_base_version(), Vec::new(), &SessionConfig::default(), true)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "nothing to commit");
}
