//! Findings and their editable payload
//!
//! A [`Finding`] is identity ([`FindingId`], owning [`ScopeId`]) plus a
//! [`FindingPayload`]. Staged edits only ever carry payloads, so the payload
//! is where schema validation lives.

use crate::error::{FieldIssue, ValidationError};
use crate::ids::{FindingId, ScopeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity. Ordering puts `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Reviewer acknowledgement. A finding is validated or invalidated, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Validated(DateTime<Utc>),
    Invalidated(DateTime<Utc>),
}

/// Reviewer feedback attached to a finding
///
/// Serialized flat as `feedback`, `validated_at`, `invalidated_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ReviewWire", into = "ReviewWire")]
pub struct Review {
    pub feedback: Option<String>,
    pub verdict: Option<Verdict>,
}

impl Review {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feedback.is_none() && self.verdict.is_none()
    }

    #[must_use]
    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        match self.verdict {
            Some(Verdict::Validated(at)) => Some(at),
            _ => None,
        }
    }

    #[must_use]
    pub fn invalidated_at(&self) -> Option<DateTime<Utc>> {
        match self.verdict {
            Some(Verdict::Invalidated(at)) => Some(at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReviewWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalidated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReviewWire> for Review {
    type Error = ValidationError;

    fn try_from(wire: ReviewWire) -> Result<Self, Self::Error> {
        let verdict = match (wire.validated_at, wire.invalidated_at) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::field(
                    "validated_at",
                    "conflicts with invalidated_at",
                ))
            }
            (Some(at), None) => Some(Verdict::Validated(at)),
            (None, Some(at)) => Some(Verdict::Invalidated(at)),
            (None, None) => None,
        };
        Ok(Self {
            feedback: wire.feedback,
            verdict,
        })
    }
}

impl From<Review> for ReviewWire {
    fn from(review: Review) -> Self {
        Self {
            validated_at: review.validated_at(),
            invalidated_at: review.invalidated_at(),
            feedback: review.feedback,
        }
    }
}

/// Editable fields of a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub finding_type: String,
    pub level: Severity,
    pub explanation: String,
    pub recommendation: String,
    pub reference: String,
    #[serde(flatten)]
    pub review: Review,
}

impl FindingPayload {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        finding_type: impl Into<String>,
        level: Severity,
        explanation: impl Into<String>,
        recommendation: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            finding_type: finding_type.into(),
            level,
            explanation: explanation.into(),
            recommendation: recommendation.into(),
            reference: reference.into(),
            review: Review::default(),
        }
    }

    /// Schema validation. Every required text field must be non-blank.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] naming every failing field
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("name", &self.name),
            ("type", &self.finding_type),
            ("explanation", &self.explanation),
            ("recommendation", &self.recommendation),
            ("reference", &self.reference),
        ];

        let issues: Vec<FieldIssue> = required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| FieldIssue {
                field,
                reason: "is required",
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

/// Partial edit over a [`FindingPayload`]; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub finding_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
}

impl FindingPatch {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn finding_type(mut self, finding_type: impl Into<String>) -> Self {
        self.finding_type = Some(finding_type.into());
        self
    }

    #[must_use]
    pub fn level(mut self, level: Severity) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub fn review(mut self, review: Review) -> Self {
        self.review = Some(review);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay this patch on `base`
    #[must_use]
    pub fn apply_to(&self, base: &FindingPayload) -> FindingPayload {
        FindingPayload {
            name: self.name.clone().unwrap_or_else(|| base.name.clone()),
            finding_type: self
                .finding_type
                .clone()
                .unwrap_or_else(|| base.finding_type.clone()),
            level: self.level.unwrap_or(base.level),
            explanation: self
                .explanation
                .clone()
                .unwrap_or_else(|| base.explanation.clone()),
            recommendation: self
                .recommendation
                .clone()
                .unwrap_or_else(|| base.recommendation.clone()),
            reference: self
                .reference
                .clone()
                .unwrap_or_else(|| base.reference.clone()),
            review: self.review.clone().unwrap_or_else(|| base.review.clone()),
        }
    }
}

/// One detected issue within a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    /// Owning scope; must exist in the same version
    pub scope_id: ScopeId,
    #[serde(flatten)]
    pub payload: FindingPayload,
}

impl Finding {
    #[must_use]
    pub fn new(id: impl Into<FindingId>, scope_id: impl Into<ScopeId>, payload: FindingPayload) -> Self {
        Self {
            id: id.into(),
            scope_id: scope_id.into(),
            payload,
        }
    }

    #[inline]
    #[must_use]
    pub fn level(&self) -> Severity {
        self.payload.level
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.payload.name
    }
}

/// Finding totals per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, level: Severity) {
        match level {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

impl<'a> FromIterator<&'a Finding> for SeverityCounts {
    fn from_iter<I: IntoIterator<Item = &'a Finding>>(iter: I) -> Self {
        let mut counts = Self::default();
        for finding in iter {
            counts.record(finding.level());
        }
        counts
    }
}
