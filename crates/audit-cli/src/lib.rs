//! Audit CLI
//!
//! Offline drivers behind `auditctl`:
//!
//! - [`replay`]: Push a recorded status stream through a feed and tracker
//! - [`merge`]: Apply a stored draft to a version, optionally committing it
//!   through an in-memory store

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use anyhow::{Context, Result};
use audit_draft::{
    BackingStore, CommitEngine, DraftChange, DraftOverlay, InMemoryStore, MergedView, SessionConfig, VersionGraph,
};
use audit_model::AnalysisVersion;
use audit_status::{FeedItem, ScopeStatusEvent, StatusFeed, StatusSnapshot, StatusTracker, VersionStatusAggregator};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Read a version record from a JSON file
///
/// # Errors
/// Unreadable file, malformed JSON, or an inconsistent version
pub fn load_version(path: &Path) -> Result<AnalysisVersion> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing version {}", path.display()))
}

/// Read a JSON array of staged changes
///
/// # Errors
/// Unreadable file or malformed JSON
pub fn load_changes(path: &Path) -> Result<Vec<DraftChange>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing draft {}", path.display()))
}

/// Parse one event per line; blank lines are skipped
///
/// A malformed line becomes a feed fault, as a broken frame would on a live stream.
#[must_use]
pub fn parse_events(raw: &str) -> Vec<FeedItem> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| match ScopeStatusEvent::from_json(line) {
            Ok(event) => FeedItem::Event(event),
            Err(err) => {
                tracing::warn!(line = n + 1, error = %err, "malformed status event");
                FeedItem::Fault(format!("line {}: {err}", n + 1))
            }
        })
        .collect()
}

/// Result of `auditctl replay`
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Final status; `connected` is false when the stream ended on a fault
    pub snapshot: StatusSnapshot,
    pub events: usize,
    pub faults: usize,
}

/// Fold `items` into the status of `version`
///
/// # Errors
/// The tracker task panicked
pub async fn replay(version: &AnalysisVersion, items: Vec<FeedItem>, event_buffer: usize) -> Result<ReplayReport> {
    // A recording is published in one burst; the buffer must hold all of it
    // or the feed drops the overflow.
    let feed = StatusFeed::new(event_buffer.max(items.len()));
    let subscription = feed.subscribe(version.id().clone());
    let (tracker, _snapshots) = StatusTracker::new(VersionStatusAggregator::from_version(version));
    let task = tokio::spawn(tracker.run(subscription));

    let ended_on_fault = matches!(items.last(), Some(FeedItem::Fault(_)));
    let (mut events, mut faults) = (0, 0);
    for item in items {
        match item {
            FeedItem::Event(event) => {
                events += 1;
                feed.publish(version.id(), event);
            }
            FeedItem::Fault(reason) => {
                faults += 1;
                feed.fault(version.id(), reason);
            }
        }
    }
    feed.close_version(version.id());

    let aggregator = task.await.context("status tracker stopped")?;
    tracing::info!(
        version = %version.id(),
        status = %aggregator.status(),
        events,
        faults,
        "replay finished"
    );
    Ok(ReplayReport {
        snapshot: aggregator.snapshot(!ended_on_fault),
        events,
        faults,
    })
}

/// Result of `auditctl merge`
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub view: MergedView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<AnalysisVersion>,
}

/// Apply `changes` to `version`; with `commit`, materialize the result
///
/// # Errors
/// Changes that do not apply to the version, or a rejected commit
pub async fn merge(
    version: AnalysisVersion,
    changes: Vec<DraftChange>,
    config: &SessionConfig,
    commit: bool,
) -> Result<MergeReport> {
    let overlay = DraftOverlay::from_snapshot(version.clone(), changes.iter().cloned())
        .with_context(|| format!("draft does not apply to version {}", version.id()))?;
    let view = overlay.merged_view();
    if !commit {
        return Ok(MergeReport { view, committed: None });
    }

    let base_id = version.id().clone();
    let store = Arc::new(InMemoryStore::new().with_version(version)?);
    for change in &changes {
        match change {
            DraftChange::Add { id, scope_id, payload } => {
                store.stage_add(&base_id, id, scope_id, payload).await?;
            }
            DraftChange::Update {
                base_finding_id,
                payload,
            } => {
                store.stage_update(&base_id, base_finding_id, payload).await?;
            }
            DraftChange::Delete { base_finding_id } => {
                store.stage_delete(&base_id, base_finding_id).await?;
            }
        }
    }

    let engine = CommitEngine::new(store, Arc::new(VersionGraph::new())).with_verify_lineage(config.verify_lineage);
    let outcome = engine.commit(overlay).await.map_err(|rejected| rejected.error)?;
    let committed = outcome.version.map(|version| AnalysisVersion::clone(&version));
    Ok(MergeReport { view, committed })
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
