//! Analysis engines and the result types they share.
//!
//! Each engine produces a 0-100 score plus a list of findings from one
//! evidence source. The combiner in `crate::analyzer` merges them.

pub mod behavior;
pub mod headers;
pub mod ml;
pub mod reputation;
pub mod rules;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Keywords,
    Urls,
    Domains,
    Attachments,
    Html,
    Authentication,
    Routing,
    Headers,
    Reputation,
    Behavior,
    BehaviorPositive,
    Ml,
    Trusted,
}

/// One piece of evidence produced by an engine. Findings are immutable
/// once produced; the combiner only concatenates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub category: FindingCategory,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        category: FindingCategory,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            category,
            text: text.into(),
            start_index: None,
            end_index: None,
            meta: None,
        }
    }

    /// Attach byte offsets into the analyzed subject+body text, used by
    /// consumers for highlighting.
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start_index = Some(start);
        self.end_index = Some(end);
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Per-engine output: an engine-local 0-100 score, findings, and
/// engine-specific detail for the breakdown report.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResult {
    pub score: f64,
    pub findings: Vec<Finding>,
    pub details: serde_json::Value,
}

impl EngineResult {
    pub fn empty() -> Self {
        Self {
            score: 0.0,
            findings: Vec::new(),
            details: serde_json::Value::Null,
        }
    }
}

/// Clamp an engine score to the 0-100 scale before it leaves the engine.
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(42.5), 42.5);
        assert_eq!(clamp_score(160.0), 100.0);
    }

    #[test]
    fn test_finding_builder() {
        let f = Finding::new("kw", Severity::High, FindingCategory::Keywords, "match")
            .with_span(3, 9);
        assert_eq!(f.start_index, Some(3));
        assert_eq!(f.end_index, Some(9));
        assert!(f.meta.is_none());
    }
}
