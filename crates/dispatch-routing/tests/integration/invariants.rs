//! Bounds and escalation invariants across a generated corpus.

use crate::common::{engine, test_config};
use dispatch_core::{ComplexityLabel, RoutingAction, TaskRequest};

const VERBS: [&str; 6] = ["Read", "Refactor", "Audit", "Deploy", "Redesign", "Document"];
const SUBJECTS: [&str; 6] = [
    "the login form",
    "our REST API and database schema",
    "authentication and encryption settings",
    "the kubernetes cluster",
    "microservices architecture",
    "unit tests for the payment flow",
];
const QUALIFIERS: [&str; 5] = [
    "",
    "maybe if possible",
    "across the organization",
    "with caching and performance profiling",
    "for the enterprise platform",
];

fn corpus() -> Vec<String> {
    let mut descriptions = Vec::new();
    for verb in VERBS {
        for subject in SUBJECTS {
            for qualifier in QUALIFIERS {
                descriptions.push(format!("{verb} {subject} {qualifier}").trim().to_owned());
            }
        }
    }
    descriptions.push(String::new());
    descriptions.push("   \t  ".to_owned());
    descriptions.push("x".repeat(5_000));
    descriptions.push("security ".repeat(300));
    descriptions
}

fn has_enterprise_indicator(description: &str) -> bool {
    let lowered = description.to_lowercase();
    lowered.split_whitespace().any(|word| word == "enterprise")
        || lowered.contains("across the organization")
}

#[tokio::test]
async fn test_bounds_hold_for_corpus() {
    let engine = engine();
    let config = test_config();

    for description in corpus() {
        let decision = engine.route(TaskRequest::new(description.clone())).await;
        assert_ne!(decision.action, RoutingAction::Error, "{description}");
        assert!(!decision.fallback, "unexpected fallback for {description:?}");
        assert!((0.0..=1.0).contains(&decision.confidence));

        let complexity = decision.complexity.as_ref().expect("complexity present");
        assert!((0.0..=1.0).contains(&complexity.value), "{description}");
        assert_eq!(
            complexity.label,
            ComplexityLabel::from_value(
                complexity.value,
                config.classifier.simple_threshold,
                config.classifier.complex_threshold,
            )
        );

        for domain in &decision.domains {
            assert!(
                domain.confidence > 0.3 && domain.confidence <= 0.95,
                "{} reported at {} for {description:?}",
                domain.domain_id,
                domain.confidence
            );
        }
    }
}

#[tokio::test]
async fn test_enterprise_scope_or_high_score_always_escalates() {
    let engine = engine();
    let threshold = test_config().escalation.threshold;

    for description in corpus() {
        let decision = engine.route(TaskRequest::new(description.clone())).await;
        if has_enterprise_indicator(&description) || decision.escalation_score > threshold {
            assert_eq!(decision.action, RoutingAction::Escalate, "{description}");
            assert!(decision.escalation_package.is_some());
        } else {
            assert!(decision.escalation_package.is_none());
        }
    }
}

#[tokio::test]
async fn test_same_input_same_classification() {
    let first = engine();
    let second = engine();
    for description in corpus().into_iter().take(40) {
        let left = first.route(TaskRequest::new(description.clone())).await;
        let right = second.route(TaskRequest::new(description.clone())).await;
        assert_eq!(left.complexity, right.complexity, "{description}");
        assert_eq!(left.domains, right.domains, "{description}");
        assert_eq!(left.action, right.action, "{description}");
    }
}
