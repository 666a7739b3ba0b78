//! Opaque identifiers
//!
//! Backend ids are opaque strings. Locally generated ids (staged additions)
//! use ULIDs so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id
            #[inline]
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Generate a fresh, time-sortable id
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new().to_string())
            }

            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Analysis version identifier
    VersionId
);
string_id!(
    /// Scope identifier, unique within a version
    ScopeId
);
string_id!(
    /// Finding identifier. Staged changes share the id of the finding they affect.
    FindingId
);
string_id!(
    /// Reference into a code version (not an analysis version)
    CodeNodeId
);
string_id!(
    /// Code version identifier
    CodeVersionId
);
string_id!(
    /// Scope identity that survives code edits; used to match scopes across versions
    GenericId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = FindingId::generate();
        let b = FindingId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ScopeId::new("scope-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"scope-7\"");

        let back: ScopeId = serde_json::from_str("\"scope-7\"").unwrap();
        assert_eq!(back, id);
        assert_eq!(back.to_string(), "scope-7");
    }
}
