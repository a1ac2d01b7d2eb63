//! Domain classification for weighted consensus.
//!
//! The weighted strategy needs to know which expertise domain a proposal
//! belongs to. Classification sits behind [`DomainClassifier`] so the voting
//! math can be tested with a fixed domain.

use std::sync::Arc;

use crate::proposal::Proposal;

/// Domain returned when nothing in the table matches.
pub const GENERAL_DOMAIN: &str = "general";

/// Maps a proposal to an expertise domain name.
pub trait DomainClassifier: Send + Sync {
    fn classify(&self, proposal: &Proposal) -> String;
}

/// Shared reference to a classifier
pub type SharedClassifier = Arc<dyn DomainClassifier>;

/// Approximate keyword heuristic: the first domain whose keyword appears as a
/// substring of the lowercased title and description wins.
#[derive(Debug, Clone)]
pub struct KeywordDomainClassifier {
    table: Vec<(String, Vec<String>)>,
}

impl KeywordDomainClassifier {
    /// Classifier with a custom `(domain, keywords)` table, checked in order.
    pub fn new(table: Vec<(String, Vec<String>)>) -> Self {
        let table = table
            .into_iter()
            .map(|(domain, keywords)| {
                (
                    domain.to_lowercase(),
                    keywords.into_iter().map(|k| k.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { table }
    }

    pub fn shared(self) -> SharedClassifier {
        Arc::new(self)
    }
}

impl Default for KeywordDomainClassifier {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            (
                "security",
                &["security", "auth", "encrypt", "vulnerab", "credential", "permission"],
            ),
            (
                "performance",
                &["performance", "latency", "throughput", "optimi", "cache", "memory"],
            ),
            (
                "database",
                &["database", "schema", "migration", "query", "index", "sql"],
            ),
            (
                "testing",
                &["test", "coverage", "regression", "qa"],
            ),
            (
                "infrastructure",
                &["deploy", "infrastructure", "pipeline", "docker", "kubernetes", "ci/cd"],
            ),
            (
                "frontend",
                &["frontend", "ui", "ux", "component", "css"],
            ),
            (
                "architecture",
                &["architecture", "design", "refactor", "module", "pattern", "service"],
            ),
        ];

        Self::new(
            table
                .iter()
                .map(|(domain, keywords)| {
                    (
                        domain.to_string(),
                        keywords.iter().map(|k| k.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl DomainClassifier for KeywordDomainClassifier {
    fn classify(&self, proposal: &Proposal) -> String {
        let text = proposal.classification_text();
        self.table
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(domain, _)| domain.clone())
            .unwrap_or_else(|| GENERAL_DOMAIN.to_string())
    }
}

/// Classifier that always answers the same domain.
#[derive(Debug, Clone)]
pub struct FixedDomainClassifier(pub String);

impl DomainClassifier for FixedDomainClassifier {
    fn classify(&self, _proposal: &Proposal) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalType;

    fn proposal(title: &str, description: &str) -> Proposal {
        Proposal::new("p-1", "architect", ProposalType::Other, title, description)
    }

    #[test]
    fn test_keyword_match() {
        let classifier = KeywordDomainClassifier::default();
        assert_eq!(
            classifier.classify(&proposal("Rotate encryption keys", "")),
            "security"
        );
        assert_eq!(
            classifier.classify(&proposal("Speed up checkout", "Add a read-through cache")),
            "performance"
        );
        assert_eq!(
            classifier.classify(&proposal("Add schema migration", "")),
            "database"
        );
    }

    #[test]
    fn test_table_order_wins() {
        // "auth" (security) and "service" (architecture) both match.
        let classifier = KeywordDomainClassifier::default();
        assert_eq!(
            classifier.classify(&proposal("Extract auth service", "")),
            "security"
        );
    }

    #[test]
    fn test_no_match_is_general() {
        let classifier = KeywordDomainClassifier::default();
        assert_eq!(
            classifier.classify(&proposal("Rename the team channel", "")),
            GENERAL_DOMAIN
        );
    }

    #[test]
    fn test_custom_table_and_fixed() {
        let classifier = KeywordDomainClassifier::new(vec![(
            "Billing".to_string(),
            vec!["Invoice".to_string()],
        )]);
        assert_eq!(
            classifier.classify(&proposal("Fix invoice rounding", "")),
            "billing"
        );

        let fixed = FixedDomainClassifier("security".to_string());
        assert_eq!(fixed.classify(&proposal("anything", "")), "security");
    }
}
