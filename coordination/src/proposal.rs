//! Proposals: structured change requests subject to negotiation and voting.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// Unique identifier for proposals
pub type ProposalId = String;

/// Kind of change a proposal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    Architecture,
    Implementation,
    Refactor,
    Policy,
    Process,
    Other,
}

impl ProposalType {
    /// Parse a tag, coercing anything unrecognised to `Other`.
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "architecture" | "design" => Self::Architecture,
            "implementation" | "feature" => Self::Implementation,
            "refactor" | "refactoring" => Self::Refactor,
            "policy" => Self::Policy,
            "process" | "workflow" => Self::Process,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for ProposalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Architecture => write!(f, "architecture"),
            Self::Implementation => write!(f, "implementation"),
            Self::Refactor => write!(f, "refactor"),
            Self::Policy => write!(f, "policy"),
            Self::Process => write!(f, "process"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A structured change request.
///
/// Immutable once stored. A counter-proposal is a new `Proposal` with its own
/// id and proposer that records the proposal it supersedes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: AgentId,
    pub proposal_type: ProposalType,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub benefits: Vec<String>,
    pub risks: Vec<String>,
    /// Expected impact, as drafted by the oracle
    #[serde(default)]
    pub impact: String,
    /// Implementation approach, as drafted by the oracle
    #[serde(default)]
    pub approach: String,
    /// Agents whose approval is required
    pub required_approvers: BTreeSet<AgentId>,
    pub created_at: DateTime<Utc>,
    /// Proposal this one replaces, for counter-proposals
    pub supersedes: Option<ProposalId>,
}

impl Proposal {
    pub fn new(
        id: &str,
        proposer: &str,
        proposal_type: ProposalType,
        title: &str,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            proposer: proposer.to_string(),
            proposal_type,
            title: title.to_string(),
            description: description.to_string(),
            rationale: description.to_string(),
            benefits: Vec::new(),
            risks: Vec::new(),
            impact: String::new(),
            approach: String::new(),
            required_approvers: BTreeSet::new(),
            created_at: Utc::now(),
            supersedes: None,
        }
    }

    pub fn with_benefits(mut self, benefits: Vec<String>) -> Self {
        self.benefits = benefits;
        self
    }

    pub fn with_risks(mut self, risks: Vec<String>) -> Self {
        self.risks = risks;
        self
    }

    pub fn with_required_approvers<I, S>(mut self, approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        self.required_approvers = approvers.into_iter().map(Into::into).collect();
        self
    }

    /// Build a counter-proposal from an agent's modifications.
    pub fn counter(&self, id: &str, proposer: &str, changes: &ProposalModifications) -> Proposal {
        Proposal {
            id: id.to_string(),
            proposer: proposer.to_string(),
            proposal_type: self.proposal_type,
            title: changes
                .title
                .clone()
                .unwrap_or_else(|| format!("{} (revised)", self.title)),
            description: changes
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            rationale: changes
                .rationale
                .clone()
                .unwrap_or_else(|| self.rationale.clone()),
            benefits: changes
                .benefits
                .clone()
                .unwrap_or_else(|| self.benefits.clone()),
            risks: changes.risks.clone().unwrap_or_else(|| self.risks.clone()),
            impact: self.impact.clone(),
            approach: changes
                .approach
                .clone()
                .unwrap_or_else(|| self.approach.clone()),
            required_approvers: self.required_approvers.clone(),
            created_at: Utc::now(),
            supersedes: Some(self.id.clone()),
        }
    }

    /// Whether this proposal replaced an earlier one.
    pub fn is_counter(&self) -> bool {
        self.supersedes.is_some()
    }

    /// The text used for domain classification.
    pub fn classification_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }

    /// JSON payload handed to the oracle.
    pub fn to_subject(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "proposer": self.proposer,
            "type": self.proposal_type,
            "title": self.title,
            "description": self.description,
            "rationale": self.rationale,
            "benefits": self.benefits,
            "risks": self.risks,
            "impact": self.impact,
            "approach": self.approach,
        })
    }
}

/// Changes an agent asks for when counter-proposing. Unset fields keep the
/// original proposal's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalModifications {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rationale: Option<String>,
    pub benefits: Option<Vec<String>>,
    pub risks: Option<Vec<String>>,
    pub approach: Option<String>,
}
