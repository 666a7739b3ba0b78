//! Analysis progress states

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress of a scope, or the aggregate of a whole version
///
/// `waiting -> processing -> {success, failed, partial}`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Queued, not yet picked up by a worker
    #[default]
    Waiting,
    /// A worker is analyzing the scope
    Processing,
    /// Analysis finished cleanly
    Success,
    /// Analysis failed
    Failed,
    /// Analysis finished with incomplete results
    Partial,
}

impl AnalysisStatus {
    /// All states, in declaration order
    pub const ALL: [AnalysisStatus; 5] = [
        AnalysisStatus::Waiting,
        AnalysisStatus::Processing,
        AnalysisStatus::Success,
        AnalysisStatus::Failed,
        AnalysisStatus::Partial,
    ];

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Partial)
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unrecognized status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown analysis status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AnalysisStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!AnalysisStatus::Waiting.is_terminal());
        assert!(!AnalysisStatus::Processing.is_terminal());
        assert!(AnalysisStatus::Success.is_terminal());
        assert!(AnalysisStatus::Failed.is_terminal());
        assert!(AnalysisStatus::Partial.is_terminal());
    }

    #[test]
    fn parses_wire_names() {
        for status in AnalysisStatus::ALL {
            assert_eq!(status.as_str().parse::<AnalysisStatus>(), Ok(status));
        }
        assert!("done".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&AnalysisStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
