//! Negotiation state machine: statuses, stances, rounds and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::proposal::ProposalId;

/// Negotiation identifier, `negotiation-<n>`.
pub type NegotiationId = String;

/// Status of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Created, no round run yet.
    Proposed,
    /// Rounds in progress.
    UnderReview,
    /// Support reached the consensus threshold.
    ConsensusReached,
    /// Support collapsed, or opposition outweighed support at the end.
    Rejected,
    /// Round budget spent with counter-proposals still open.
    CounterProposed,
    /// Round budget spent with neither consensus nor rejection.
    Stalemate,
}

impl NegotiationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ConsensusReached | Self::Rejected | Self::CounterProposed | Self::Stalemate
        )
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [NegotiationStatus] {
        match self {
            Self::Proposed => &[Self::UnderReview],
            Self::UnderReview => &[
                Self::ConsensusReached,
                Self::Rejected,
                Self::CounterProposed,
                Self::Stalemate,
            ],
            Self::ConsensusReached | Self::Rejected | Self::CounterProposed | Self::Stalemate => {
                &[]
            }
        }
    }
}

impl std::fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::UnderReview => write!(f, "under_review"),
            Self::ConsensusReached => write!(f, "consensus_reached"),
            Self::Rejected => write!(f, "rejected"),
            Self::CounterProposed => write!(f, "counter_proposed"),
            Self::Stalemate => write!(f, "stalemate"),
        }
    }
}

/// A participant's position on the proposal under negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Support,
    Oppose,
    CounterPropose,
}

impl Stance {
    /// Strict parse. `None` means the answer is unusable and the caller's
    /// fallback stance applies.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "support" | "supports" | "approve" => Some(Self::Support),
            "oppose" | "opposes" | "reject" => Some(Self::Oppose),
            "counter_propose" | "counter_proposal" | "counter" => Some(Self::CounterPropose),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "support"),
            Self::Oppose => write!(f, "oppose"),
            Self::CounterPropose => write!(f, "counter_propose"),
        }
    }
}

/// One round of negotiation over a single proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationRound {
    /// Round number (1-indexed).
    pub round: u32,
    /// Proposal under consideration this round.
    pub proposal_id: ProposalId,
    /// Counter-proposals raised this round, in submission order.
    pub counter_proposals: Vec<ProposalId>,
    pub arguments_for: Vec<(AgentId, String)>,
    pub arguments_against: Vec<(AgentId, String)>,
    /// Arguments attached to counter-proposals.
    pub counter_arguments: Vec<(AgentId, String)>,
    /// Supporters over all participants.
    pub support_ratio: f64,
    /// Stances that came from the fallback rather than the oracle.
    pub fallback_stances: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl NegotiationRound {
    pub fn support(&self) -> usize {
        self.arguments_for.len()
    }

    pub fn opposition(&self) -> usize {
        self.arguments_against.len()
    }

    pub fn has_counter_proposals(&self) -> bool {
        !self.counter_proposals.is_empty()
    }
}

/// A status transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationTransition {
    pub from: NegotiationStatus,
    pub to: NegotiationStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransitionError {
    pub from: NegotiationStatus,
    pub to: NegotiationStatus,
}

impl std::fmt::Display for StatusTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid negotiation transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for StatusTransitionError {}

/// A negotiation session: status, rounds and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationRecord {
    pub id: NegotiationId,
    /// Proposal the negotiation started from.
    pub proposal_id: ProposalId,
    /// Proposal currently under negotiation (changes when a counter is adopted).
    pub current_proposal_id: ProposalId,
    pub status: NegotiationStatus,
    pub max_rounds: u32,
    pub rounds: Vec<NegotiationRound>,
    pub transitions: Vec<NegotiationTransition>,
    pub created_at: DateTime<Utc>,
}

impl NegotiationRecord {
    pub fn new(id: &str, proposal_id: &str, max_rounds: u32) -> Self {
        Self {
            id: id.to_string(),
            proposal_id: proposal_id.to_string(),
            current_proposal_id: proposal_id.to_string(),
            status: NegotiationStatus::Proposed,
            max_rounds,
            rounds: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Move to a new status with a reason.
    pub fn transition(
        &mut self,
        to: NegotiationStatus,
        reason: &str,
    ) -> Result<(), StatusTransitionError> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(StatusTransitionError {
                from: self.status,
                to,
            });
        }

        self.transitions.push(NegotiationTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.status = to;
        Ok(())
    }

    pub fn record_round(&mut self, round: NegotiationRound) {
        self.rounds.push(round);
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn last_round(&self) -> Option<&NegotiationRound> {
        self.rounds.last()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | proposal={} (from {})",
            self.status,
            self.rounds.len(),
            self.max_rounds,
            self.current_proposal_id,
            self.proposal_id
        )
    }
}
