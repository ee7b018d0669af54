//! Versioned rule tables driving classification, domain detection and escalation.
//!
//! Rule sets are plain TOML documents. The built-in set is embedded at compile
//! time; deployments can replace it with a file without rebuilding.

use crate::error::{Error, Result};
use crate::types::HandlerCapability;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Rule-set format version understood by this build.
pub const SUPPORTED_RULES_VERSION: u32 = 1;

const BUILTIN_RULES: &str = include_str!("../rules/default.toml");

/// Keyword and marker tables used by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Terms indicating simple work, with weights
    pub simple_keywords: BTreeMap<String, f64>,
    /// Terms indicating complex work, with weights
    pub complex_keywords: BTreeMap<String, f64>,
    /// Conditional markers (`if`, `unless`, ...)
    pub conditional_markers: Vec<String>,
    /// Conjunction markers (`and`, `with`, ...)
    pub conjunction_markers: Vec<String>,
    /// Inter-dependency markers (`integrate`, `across`, ...)
    pub dependency_markers: Vec<String>,
    /// Words widening the scope (`all`, `entire`, ...)
    pub scope_words: Vec<String>,
}

/// Matcher definition for one functional domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRule {
    /// Domain identifier
    pub id: String,
    /// How much this domain tends to raise complexity, in `[0, 1]`
    pub complexity_bias: f64,
    /// Strong indicator terms
    pub primary_terms: Vec<String>,
    /// Weaker indicator terms
    pub secondary_terms: Vec<String>,
    /// Verbs describing domain operations
    pub operation_verbs: Vec<String>,
    /// Multi-word contextual phrases
    pub phrases: Vec<String>,
    /// Regular expressions over file references
    pub file_patterns: Vec<String>,
    /// Handlers preferred for this domain, best first
    pub preferred_handlers: Vec<String>,
}

/// Indicator tables used by the escalation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationRules {
    /// Words or phrases signalling organization-wide scope
    pub enterprise_indicators: Vec<String>,
    /// Words or phrases signalling architectural decisions
    pub architectural_indicators: Vec<String>,
    /// Regular expressions signalling vague requirements
    pub ambiguity_patterns: Vec<String>,
}

/// A handler in the default capability catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRule {
    /// Handler identifier
    pub id: String,
    /// Capability description
    pub description: String,
}

/// A complete, versioned rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Format version
    pub version: u32,
    /// Human-readable name
    pub name: String,
    /// Words ignored when measuring content overlap
    #[serde(default)]
    pub stop_words: Vec<String>,
    /// Classifier tables
    #[serde(default)]
    pub classifier: ClassifierRules,
    /// Domain matchers
    #[serde(default)]
    pub domains: Vec<DomainRule>,
    /// Escalation tables
    #[serde(default)]
    pub escalation: EscalationRules,
    /// Default handler catalog
    #[serde(default)]
    pub handlers: Vec<HandlerRule>,
}

impl RuleSet {
    /// Parses and validates the embedded rule set.
    ///
    /// # Errors
    /// Returns an error if the embedded document is invalid
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_RULES)
    }

    /// Raw text of the embedded rule set.
    pub fn builtin_source() -> &'static str {
        BUILTIN_RULES
    }

    /// Parses and validates a rule set from TOML text.
    ///
    /// # Errors
    /// Returns an error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let rules: Self = toml::from_str(contents)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Loads and validates a rule set file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let rules = Self::from_toml(&contents)?;
        debug!(path = %path.display(), name = %rules.name, version = rules.version, "rule set loaded");
        Ok(rules)
    }

    /// Writes the rule set as TOML.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default capability catalog as handler capabilities.
    pub fn handler_capabilities(&self) -> Vec<HandlerCapability> {
        self.handlers
            .iter()
            .map(|handler| HandlerCapability::new(&handler.id, &handler.description))
            .collect()
    }

    /// Checks version, identifiers, ranges and every regular expression.
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.version != SUPPORTED_RULES_VERSION {
            return Err(Error::InvalidRules(format!(
                "unsupported rule set version {} (expected {SUPPORTED_RULES_VERSION})",
                self.version
            )));
        }
        if self.domains.is_empty() {
            return Err(Error::InvalidRules("at least one domain is required".to_owned()));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            if domain.id.trim().is_empty() {
                return Err(Error::InvalidRules("domain id must not be empty".to_owned()));
            }
            if !seen.insert(domain.id.as_str()) {
                return Err(Error::InvalidRules(format!("duplicate domain id '{}'", domain.id)));
            }
            if !(0.0..=1.0).contains(&domain.complexity_bias) {
                return Err(Error::InvalidRules(format!(
                    "domain '{}' complexity_bias {} is outside [0, 1]",
                    domain.id, domain.complexity_bias
                )));
            }
            if domain.primary_terms.is_empty() {
                return Err(Error::InvalidRules(format!(
                    "domain '{}' has no primary terms",
                    domain.id
                )));
            }
            for pattern in &domain.file_patterns {
                Regex::new(pattern)?;
            }
        }

        for pattern in &self.escalation.ambiguity_patterns {
            Regex::new(pattern)?;
        }

        let keyword_weights = self
            .classifier
            .simple_keywords
            .values()
            .chain(self.classifier.complex_keywords.values());
        for weight in keyword_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::InvalidRules(
                    "classifier keyword weights must be finite and non-negative".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_rules_parse() {
        let rules = RuleSet::builtin().expect("builtin rules should be valid");
        assert_eq!(rules.version, SUPPORTED_RULES_VERSION);
        let ids: Vec<&str> = rules.domains.iter().map(|domain| domain.id.as_str()).collect();
        for expected in ["frontend", "backend", "security", "performance", "architecture"] {
            assert!(ids.contains(&expected), "missing domain {expected}");
        }
        assert_eq!(rules.handler_capabilities().len(), rules.handlers.len());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let source = RuleSet::builtin_source().replacen("version = 1", "version = 7", 1);
        let error = RuleSet::from_toml(&source).expect_err("version 7 is unsupported");
        assert!(error.to_string().contains("unsupported rule set version"));
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let mut rules = RuleSet::builtin().expect("builtin rules");
        let duplicate = rules.domains[0].clone();
        rules.domains.push(duplicate);
        let error = rules.validate().expect_err("duplicate id");
        assert!(error.to_string().contains("duplicate domain id"));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let mut rules = RuleSet::builtin().expect("builtin rules");
        rules.escalation.ambiguity_patterns.push("(unclosed".to_owned());
        assert!(matches!(rules.validate(), Err(Error::Regex(_))));
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("rules.toml");
        let rules = RuleSet::builtin().expect("builtin rules");
        rules.save_to_file(&path).expect("save rules");
        let reloaded = RuleSet::load_from_file(&path).expect("reload rules");
        assert_eq!(reloaded, rules);
    }
}
