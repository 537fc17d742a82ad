//! Span severity.
//!
//! Severities are ordered; merging two hints always keeps the more urgent
//! one, so an outcome can escalate a span but never de-escalate it.

use serde::{Deserialize, Serialize};

/// Urgency level governing whether a span is guaranteed to be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Subject to normal sampling.
    #[default]
    Default,
    /// Collected regardless of sampling.
    MustCollect,
}

impl Severity {
    /// `a >= b` in urgency order.
    pub fn gte(a: Severity, b: Severity) -> bool {
        a >= b
    }

    /// Escalate-only merge of two hints.
    pub fn merge(self, other: Severity) -> Severity {
        self.max(other)
    }

    pub fn is_must_collect(self) -> bool {
        Severity::gte(self, Severity::MustCollect)
    }
}
