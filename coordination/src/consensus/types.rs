//! Votes, strategies and decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::proposal::ProposalId;

/// One agent's judgment on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Approve,
    Reject,
    Abstain,
    /// Blocks the proposal under every majority-family strategy.
    Veto,
}

impl VoteType {
    /// Parse a vote string. Unknown values coerce to `Abstain`.
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" | "yes" | "support" => Self::Approve,
            "reject" | "rejected" | "no" | "oppose" => Self::Reject,
            "veto" | "block" => Self::Veto,
            _ => Self::Abstain,
        }
    }

    /// Whether this vote counts toward an approve/reject tally.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }
}

impl std::fmt::Display for VoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Abstain => write!(f, "abstain"),
            Self::Veto => write!(f, "veto"),
        }
    }
}

/// A single vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: AgentId,
    pub vote: VoteType,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    /// Multiplier applied on top of expertise by the weighted strategy
    pub weight: f64,
}

impl Vote {
    pub fn new(voter: &str, vote: VoteType, confidence: f64) -> Self {
        Self {
            voter: voter.to_string(),
            vote,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: String::new(),
            weight: 1.0,
        }
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = rationale.to_string();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.max(0.0);
        self
    }
}

/// Rule turning a set of votes into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// More than half of approve/reject votes approve.
    SimpleMajority,
    /// More than the super-majority threshold (default 0.66) approve.
    SuperMajority,
    /// Every non-abstaining vote approves.
    Unanimous,
    /// Expertise × confidence weighted approval above one half.
    Weighted,
    /// The oracle decides given all votes; simple majority if it cannot.
    OracleArbitration,
    /// Approvals over all votes reach the negotiation threshold.
    Negotiated,
}

impl ConsensusStrategy {
    /// Parse a strategy name. Unknown values coerce to `SimpleMajority`.
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "super_majority" | "supermajority" => Self::SuperMajority,
            "unanimous" | "unanimity" => Self::Unanimous,
            "weighted" | "expertise_weighted" => Self::Weighted,
            "oracle_arbitration" | "oracle" | "arbitration" => Self::OracleArbitration,
            "negotiated" => Self::Negotiated,
            _ => Self::SimpleMajority,
        }
    }

    /// Strategies where a single veto forces rejection.
    pub fn honors_veto(self) -> bool {
        matches!(
            self,
            Self::SimpleMajority | Self::SuperMajority | Self::Weighted
        )
    }
}

impl std::fmt::Display for ConsensusStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SimpleMajority => write!(f, "simple_majority"),
            Self::SuperMajority => write!(f, "super_majority"),
            Self::Unanimous => write!(f, "unanimous"),
            Self::Weighted => write!(f, "weighted"),
            Self::OracleArbitration => write!(f, "oracle_arbitration"),
            Self::Negotiated => write!(f, "negotiated"),
        }
    }
}

/// Counts per vote type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
    pub veto: usize,
}

impl VoteTally {
    pub fn of(votes: &[Vote]) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            match vote.vote {
                VoteType::Approve => tally.approve += 1,
                VoteType::Reject => tally.reject += 1,
                VoteType::Abstain => tally.abstain += 1,
                VoteType::Veto => tally.veto += 1,
            }
        }
        tally
    }

    /// Approve + reject.
    pub fn active(&self) -> usize {
        self.approve + self.reject
    }

    pub fn total(&self) -> usize {
        self.approve + self.reject + self.abstain + self.veto
    }
}

/// The outcome of applying a strategy to a vote set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    /// Proposal decided on, when known
    pub proposal_id: Option<ProposalId>,
    /// Approve, Reject or Abstain, never Veto
    pub decision: VoteType,
    pub strategy: ConsensusStrategy,
    pub votes: Vec<Vote>,
    pub consensus_reached: bool,
    /// In [0, 1]
    pub approval_ratio: f64,
    pub rationale: String,
    pub tie_broken_by_oracle: bool,
    pub decided_at: DateTime<Utc>,
}

impl ConsensusDecision {
    pub(crate) fn new(
        strategy: ConsensusStrategy,
        votes: Vec<Vote>,
        decision: VoteType,
        consensus_reached: bool,
        approval_ratio: f64,
        rationale: String,
    ) -> Self {
        debug_assert!(decision != VoteType::Veto);
        Self {
            proposal_id: None,
            decision,
            strategy,
            votes,
            consensus_reached,
            approval_ratio: approval_ratio.clamp(0.0, 1.0),
            rationale,
            tie_broken_by_oracle: false,
            decided_at: Utc::now(),
        }
    }

    pub fn for_proposal(mut self, proposal_id: &str) -> Self {
        self.proposal_id = Some(proposal_id.to_string());
        self
    }

    pub fn is_approved(&self) -> bool {
        self.decision == VoteType::Approve
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally::of(&self.votes)
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} | ratio={:.3} | consensus={} | votes={}",
            self.strategy,
            self.decision,
            self.approval_ratio,
            self.consensus_reached,
            self.votes.len()
        )
    }
}
