//! Compiled, immutable form of a [`RuleSet`].

use super::text::{TaskText, normalize_phrase};
use crate::error::Result;
use dispatch_core::{Error as CoreError, HandlerCapability, RuleSet};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Matcher tables for one domain.
#[derive(Debug, Clone)]
pub struct CompiledDomain {
    /// Domain identifier
    pub id: String,
    /// Complexity bias in `[0, 1]`
    pub complexity_bias: f64,
    /// Strong indicator terms
    pub primary_terms: HashSet<String>,
    /// Weaker indicator terms
    pub secondary_terms: HashSet<String>,
    /// Operation verbs
    pub operation_verbs: HashSet<String>,
    /// Normalized phrases
    pub phrases: Vec<String>,
    /// File-reference patterns
    pub file_patterns: Vec<Regex>,
    /// Preferred handlers, best first
    pub preferred_handlers: Vec<String>,
}

impl CompiledDomain {
    /// Whether any token is a primary term of this domain.
    pub fn has_primary_hit(&self, text: &TaskText) -> bool {
        text.tokens()
            .iter()
            .any(|token| self.primary_terms.contains(token))
    }
}

/// Rule tables compiled for fast matching.
#[derive(Debug, Clone)]
pub struct Rulebook {
    version: u32,
    name: String,
    stop_words: HashSet<String>,
    simple_keywords: HashMap<String, f64>,
    complex_keywords: HashMap<String, f64>,
    conditional_markers: HashSet<String>,
    conjunction_markers: HashSet<String>,
    dependency_markers: HashSet<String>,
    scope_words: HashSet<String>,
    domains: Vec<CompiledDomain>,
    enterprise_indicators: Vec<String>,
    architectural_indicators: Vec<String>,
    ambiguity_patterns: Vec<Regex>,
    handlers: Vec<HandlerCapability>,
}

fn lowered_set(terms: &[String]) -> HashSet<String> {
    terms.iter().map(|term| term.to_lowercase()).collect()
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        compiled.push(Regex::new(pattern).map_err(CoreError::from)?);
    }
    Ok(compiled)
}

impl Rulebook {
    /// Validates and compiles a rule set.
    ///
    /// # Errors
    /// Returns an error if the rule set is invalid
    pub fn compile(rules: &RuleSet) -> Result<Self> {
        rules.validate()?;

        let mut domains = Vec::with_capacity(rules.domains.len());
        for domain in &rules.domains {
            domains.push(CompiledDomain {
                id: domain.id.clone(),
                complexity_bias: domain.complexity_bias,
                primary_terms: lowered_set(&domain.primary_terms),
                secondary_terms: lowered_set(&domain.secondary_terms),
                operation_verbs: lowered_set(&domain.operation_verbs),
                phrases: domain.phrases.iter().map(|phrase| normalize_phrase(phrase)).collect(),
                file_patterns: compile_patterns(&domain.file_patterns)?,
                preferred_handlers: domain.preferred_handlers.clone(),
            });
        }

        let keyword_map = |keywords: &BTreeMap<String, f64>| {
            keywords
                .iter()
                .map(|(term, weight)| (term.to_lowercase(), *weight))
                .collect::<HashMap<_, _>>()
        };

        Ok(Self {
            version: rules.version,
            name: rules.name.clone(),
            stop_words: lowered_set(&rules.stop_words),
            simple_keywords: keyword_map(&rules.classifier.simple_keywords),
            complex_keywords: keyword_map(&rules.classifier.complex_keywords),
            conditional_markers: lowered_set(&rules.classifier.conditional_markers),
            conjunction_markers: lowered_set(&rules.classifier.conjunction_markers),
            dependency_markers: lowered_set(&rules.classifier.dependency_markers),
            scope_words: lowered_set(&rules.classifier.scope_words),
            domains,
            enterprise_indicators: rules
                .escalation
                .enterprise_indicators
                .iter()
                .map(|phrase| normalize_phrase(phrase))
                .collect(),
            architectural_indicators: rules
                .escalation
                .architectural_indicators
                .iter()
                .map(|phrase| normalize_phrase(phrase))
                .collect(),
            ambiguity_patterns: compile_patterns(&rules.escalation.ambiguity_patterns)?,
            handlers: rules.handler_capabilities(),
        })
    }

    /// Compiles the embedded rule set.
    ///
    /// # Errors
    /// Returns an error if the embedded rules are invalid
    pub fn builtin() -> Result<Self> {
        Self::compile(&RuleSet::builtin()?)
    }

    /// Rule-set format version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Rule-set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiled domains in rule order.
    pub fn domains(&self) -> &[CompiledDomain] {
        &self.domains
    }

    /// Default handler catalog.
    pub fn handlers(&self) -> &[HandlerCapability] {
        &self.handlers
    }

    /// Weight of a simple keyword.
    pub fn simple_weight(&self, token: &str) -> Option<f64> {
        self.simple_keywords.get(token).copied()
    }

    /// Weight of a complex keyword.
    pub fn complex_weight(&self, token: &str) -> Option<f64> {
        self.complex_keywords.get(token).copied()
    }

    /// Tokens that are not stop words.
    pub fn content_terms<'text>(&self, tokens: &'text [String]) -> Vec<&'text str> {
        tokens
            .iter()
            .filter(|token| !self.stop_words.contains(token.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Number of conditional and conjunction markers.
    pub fn conditional_count(&self, text: &TaskText) -> usize {
        text.tokens()
            .iter()
            .filter(|token| {
                self.conditional_markers.contains(token.as_str())
                    || self.conjunction_markers.contains(token.as_str())
            })
            .count()
    }

    /// Number of inter-dependency markers.
    pub fn dependency_count(&self, text: &TaskText) -> usize {
        text.tokens()
            .iter()
            .filter(|token| self.dependency_markers.contains(token.as_str()))
            .count()
    }

    /// Number of scope-widening words.
    pub fn scope_count(&self, text: &TaskText) -> usize {
        text.tokens()
            .iter()
            .filter(|token| self.scope_words.contains(token.as_str()))
            .count()
    }

    /// Distinct domains with at least one primary-term hit.
    pub fn domain_span(&self, text: &TaskText) -> usize {
        self.domains
            .iter()
            .filter(|domain| domain.has_primary_hit(text))
            .count()
    }

    /// Enterprise-scope indicators present in the text.
    pub fn enterprise_hits(&self, text: &TaskText) -> Vec<String> {
        self.enterprise_indicators
            .iter()
            .filter(|indicator| text.contains_phrase(indicator))
            .cloned()
            .collect()
    }

    /// Architectural indicators present in the text.
    pub fn architectural_hits(&self, text: &TaskText) -> Vec<String> {
        self.architectural_indicators
            .iter()
            .filter(|indicator| text.contains_phrase(indicator))
            .cloned()
            .collect()
    }

    /// Total ambiguity-pattern matches in the lowercased description.
    pub fn ambiguity_count(&self, text: &TaskText) -> usize {
        self.ambiguity_patterns
            .iter()
            .map(|pattern| pattern.find_iter(text.lowered()).count())
            .sum()
    }
}
