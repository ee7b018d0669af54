//! Request and analysis types shared by every routing stage.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A unit of work to route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Free-form description of the work
    pub description: String,
    /// Optional caller-supplied hints (project, language, deadline, ...)
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl TaskRequest {
    /// Creates a request without context hints.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: BTreeMap::new(),
        }
    }

    /// Adds a context hint.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Normalized hash of a task description, used as a cache and history key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskSignature(pub u64);

impl fmt::Display for TaskSignature {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:016x}", self.0)
    }
}

/// Coarse complexity bucket derived from a [`ComplexityScore`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplexityLabel {
    /// Value below the simple threshold
    Simple,
    /// Value between the thresholds
    Standard,
    /// Value above the complex threshold
    Complex,
}

impl ComplexityLabel {
    /// Maps a complexity value onto a label.
    ///
    /// `simple_below` and `complex_above` are exclusive bounds, so a value
    /// exactly on a threshold is `Standard`.
    pub fn from_value(value: f64, simple_below: f64, complex_above: f64) -> Self {
        if value < simple_below {
            Self::Simple
        } else if value > complex_above {
            Self::Complex
        } else {
            Self::Standard
        }
    }
}

impl fmt::Display for ComplexityLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "simple",
            Self::Standard => "standard",
            Self::Complex => "complex",
        };
        write!(formatter, "{name}")
    }
}

/// Which classifier level produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationLevel {
    /// Keyword fast path
    Fast,
    /// Multi-factor analysis
    Detailed,
    /// Empty or unusable input
    Degraded,
}

/// Output of the hierarchical classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    /// Complexity in `[0, 1]`
    pub value: f64,
    /// Label derived from `value`
    pub label: ComplexityLabel,
    /// How certain the classifier is about the label
    pub confidence: f64,
    /// Level that produced the score
    pub level: ClassificationLevel,
    /// Keywords and markers that contributed
    pub signals: Vec<String>,
}

/// A functional domain detected in a task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMatch {
    /// Domain identifier (e.g. `security`)
    pub domain_id: String,
    /// Match confidence in `(0.3, 0.95]`
    pub confidence: f64,
    /// How much this domain tends to raise task complexity
    pub complexity_bias: f64,
    /// Handlers preferred for this domain, best first
    #[serde(default)]
    pub preferred_handlers: Vec<String>,
}

/// A candidate handler and its capability text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerCapability {
    /// Handler identifier
    pub id: String,
    /// Free-form capability description
    pub description: String,
}

impl HandlerCapability {
    /// Creates a capability entry.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_thresholds_are_exclusive() {
        assert_eq!(ComplexityLabel::from_value(0.0, 0.3, 0.7), ComplexityLabel::Simple);
        assert_eq!(ComplexityLabel::from_value(0.29, 0.3, 0.7), ComplexityLabel::Simple);
        assert_eq!(ComplexityLabel::from_value(0.3, 0.3, 0.7), ComplexityLabel::Standard);
        assert_eq!(ComplexityLabel::from_value(0.7, 0.3, 0.7), ComplexityLabel::Standard);
        assert_eq!(ComplexityLabel::from_value(0.71, 0.3, 0.7), ComplexityLabel::Complex);
    }

    #[test]
    fn test_request_context_builder() {
        let request = TaskRequest::new("Deploy the api")
            .with_context("environment", "staging")
            .with_context("team", "platform");
        assert_eq!(request.context.len(), 2);
        assert_eq!(
            request.context.get("environment").map(String::as_str),
            Some("staging")
        );
    }

    #[test]
    fn test_request_deserializes_without_context() {
        let request: TaskRequest =
            serde_json::from_str(r#"{"description":"Fix the login form"}"#).expect("valid json");
        assert!(request.context.is_empty(), "context should default to empty");
    }

    #[test]
    fn test_signature_display_is_fixed_width() {
        assert_eq!(TaskSignature(0xab).to_string(), "00000000000000ab");
    }
}
