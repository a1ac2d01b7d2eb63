//! The fixed set of specialist agents and their expertise.
//!
//! Agents are identified by a stable string id (usually the role tag, e.g.
//! `architect`, `security`). Each agent carries per-domain expertise weights
//! used by weighted consensus and by task assignment scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable agent identifier.
pub type AgentId = String;

/// Weight assumed for any domain an agent has no recorded expertise in.
pub const DEFAULT_DOMAIN_WEIGHT: f64 = 0.5;

/// A specialist agent participating in negotiation and task assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity / role tag.
    pub id: AgentId,
    /// Human-readable role description handed to the oracle.
    #[serde(default)]
    pub role: String,
    /// Domain name → weight in [0, 1].
    #[serde(default)]
    pub expertise: BTreeMap<String, f64>,
    /// Concurrency limit override; the scheduler default applies when unset.
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
}

impl Agent {
    pub fn new(id: &str, role: &str) -> Self {
        Self {
            id: id.to_string(),
            role: role.to_string(),
            expertise: BTreeMap::new(),
            max_concurrent_tasks: None,
        }
    }

    /// Record expertise in a domain. Weights are clamped to [0, 1].
    pub fn with_expertise(mut self, domain: &str, weight: f64) -> Self {
        self.expertise
            .insert(domain.to_lowercase(), weight.clamp(0.0, 1.0));
        self
    }

    pub fn with_capacity(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = Some(max_concurrent_tasks);
        self
    }

    /// Expertise weight for `domain`, defaulting to [`DEFAULT_DOMAIN_WEIGHT`].
    pub fn domain_weight(&self, domain: &str) -> f64 {
        self.expertise
            .get(&domain.to_lowercase())
            .copied()
            .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
    }

    /// Number of required expertise terms this agent has a recorded domain for.
    pub fn expertise_overlap(&self, required: &BTreeSet<String>) -> usize {
        required
            .iter()
            .filter(|term| self.expertise.contains_key(&term.to_lowercase()))
            .count()
    }

    /// Lowercase domain keys and clamp weights, for agents loaded from files.
    pub fn normalized(mut self) -> Self {
        self.expertise = self
            .expertise
            .into_iter()
            .map(|(domain, weight)| (domain.to_lowercase(), weight.clamp(0.0, 1.0)))
            .collect();
        self
    }

    /// Role text, falling back to the id when no description was given.
    pub fn role_label(&self) -> &str {
        if self.role.is_empty() {
            &self.id
        } else {
            &self.role
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Shared, read-only roster.
pub type SharedRoster = Arc<AgentRoster>;

/// The fixed set of agents, in registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRoster {
    agents: Vec<Agent>,
}

impl AgentRoster {
    /// Build a roster. Later duplicates of an id replace earlier ones in place.
    pub fn new(agents: Vec<Agent>) -> Self {
        let mut roster = Self { agents: Vec::new() };
        for agent in agents {
            let agent = agent.normalized();
            if let Some(existing) = roster.agents.iter_mut().find(|a| a.id == agent.id) {
                *existing = agent;
            } else {
                roster.agents.push(agent);
            }
        }
        roster
    }

    pub fn shared(self) -> SharedRoster {
        Arc::new(self)
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Expertise of `agent_id` in `domain`; unknown agents get the default.
    pub fn domain_weight(&self, agent_id: &str, domain: &str) -> f64 {
        self.get(agent_id)
            .map(|a| a.domain_weight(domain))
            .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security_agent() -> Agent {
        Agent::new("security", "Security reviewer")
            .with_expertise("security", 0.95)
            .with_expertise("Architecture", 0.6)
    }

    #[test]
    fn test_domain_weight_default() {
        let agent = security_agent();
        assert!((agent.domain_weight("security") - 0.95).abs() < f64::EPSILON);
        assert!((agent.domain_weight("architecture") - 0.6).abs() < f64::EPSILON);
        assert!((agent.domain_weight("frontend") - DEFAULT_DOMAIN_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expertise_clamped() {
        let agent = Agent::new("a", "").with_expertise("testing", 1.7);
        assert!((agent.domain_weight("testing") - 1.0).abs() < f64::EPSILON);
        assert_eq!(agent.role_label(), "a");
    }

    #[test]
    fn test_expertise_overlap() {
        let agent = security_agent();
        let required: BTreeSet<String> = ["security", "database", "ARCHITECTURE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(agent.expertise_overlap(&required), 2);
    }

    #[test]
    fn test_roster_lookup_and_duplicates() {
        let roster = AgentRoster::new(vec![
            Agent::new("architect", "Architect"),
            security_agent(),
            Agent::new("architect", "Lead architect").with_capacity(4),
        ]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.ids(), vec!["architect", "security"]);
        assert_eq!(roster.get("architect").unwrap().role, "Lead architect");
        assert!((roster.domain_weight("security", "security") - 0.95).abs() < f64::EPSILON);
        assert!((roster.domain_weight("ghost", "security") - DEFAULT_DOMAIN_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_agent_from_toml() {
        let agent: Agent = toml::from_str(
            r#"
id = "performance"
role = "Performance engineer"
max_concurrent_tasks = 3

[expertise]
performance = 0.9
"#,
        )
        .unwrap();
        assert_eq!(agent.max_concurrent_tasks, Some(3));
        assert!((agent.domain_weight("performance") - 0.9).abs() < f64::EPSILON);
    }
}
