//! Audit Draft
//!
//! Staged finding edits over immutable analysis versions, and the commit
//! path that turns them into new versions.
//!
//! # Core Operations
//!
//! - **Stage**: Record add/update/delete edits in a [`DraftOverlay`] without touching the base
//! - **View**: Compute the [`MergedView`] a commit would produce
//! - **Commit**: Submit through [`CommitEngine`]; the store creates the child version
//! - **Lineage**: Track committed versions in a [`VersionGraph`]
//!
//! # Architecture
//!
//! ```text
//! edit → DraftSession → BackingStore (stage) → DraftOverlay → MergedView
//!                 └─ commit → CommitEngine → BackingStore (commit) → VersionGraph
//!                                      └─ Vec<CacheKey> → ReadCache::apply
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_draft::prelude::*;
//!
//! let mut session = DraftSession::open(store, graph, &SessionConfig::default(), &version_id).await?;
//! session.stage_update(&finding_id, &FindingPatch::new().level(Severity::High)).await?;
//! let outcome = session.commit().await?;
//! assert_eq!(outcome.parent_version_id, version_id);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod change;
pub mod commit;
pub mod config;
pub mod error;
pub mod graph;
pub mod memory;
pub mod overlay;
pub mod session;
pub mod store;
pub mod view;

pub use cache::{CacheKey, ReadCache};
pub use change::{DraftChange, DraftKind};
pub use commit::{CommitEngine, CommitOutcome, CommitRejected};
pub use config::{ConfigError, SessionConfig};
pub use error::{DraftError, EntityKind, GraphError, StoreError};
pub use graph::{ScopeSelection, VersionGraph};
pub use memory::InMemoryStore;
pub use overlay::{DeleteOutcome, DraftOverlay};
pub use session::DraftSession;
pub use store::{BackingStore, CommitReceipt, DraftSnapshot, UndoReceipt};
pub use view::{DecoratedFinding, DraftStatus, MergedView, ScopeView, ViewSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        BackingStore, CommitEngine, DraftChange, DraftError, DraftOverlay, DraftSession, DraftStatus,
        InMemoryStore, MergedView, SessionConfig, VersionGraph,
    };
    pub use audit_model::{FindingId, FindingPatch, FindingPayload, ScopeId, Severity, VersionId};
}
