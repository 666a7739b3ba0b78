//! Audit Model
//!
//! Shared data model for the analysis version lifecycle.
//!
//! # Core Concepts
//!
//! - [`Scope`]: One reviewable unit (function, modifier, contract)
//! - [`Finding`]: One detected issue, owned by a scope
//! - [`AnalysisVersion`]: Immutable snapshot of scopes and findings with a parent link
//! - [`AnalysisStatus`]: Progress state shared by scopes and versions
//! - [`FindingPayload`]: The editable fields of a finding, with schema validation
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_model::{AnalysisVersion, Scope, Finding, FindingPayload, Severity};
//!
//! let scope = Scope::new("s1", "node-1", "Vault.withdraw", "withdraw(uint256)", "g-withdraw");
//! let version = AnalysisVersion::builder("v1", "code-1")
//!     .scope(scope)
//!     .finding(Finding::new("f1", "s1", payload))
//!     .build()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod finding;
mod ids;
mod scope;
mod status;
mod version;

pub use error::{FieldIssue, ModelError, ValidationError};
pub use finding::{Finding, FindingPatch, FindingPayload, Review, Severity, SeverityCounts, Verdict};
pub use ids::{CodeNodeId, CodeVersionId, FindingId, GenericId, ScopeId, VersionId};
pub use scope::Scope;
pub use status::{AnalysisStatus, UnknownStatus};
pub use version::{AnalysisVersion, ScopeStrategy, VersionBuilder};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
