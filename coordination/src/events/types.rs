//! Event types for coordination outcomes
//!
//! These events are the hand-off point to external persistence and
//! observers; the core itself never reads them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::consensus::{ConsensusStrategy, VoteType};
use crate::negotiation::{NegotiationId, NegotiationStatus};
use crate::proposal::ProposalId;
use crate::scheduler::{TaskId, TaskPriority, Urgency};

/// Unique identifier for events
pub type EventId = String;

/// All coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    /// A proposal or counter-proposal was stored
    ProposalCreated {
        proposal_id: ProposalId,
        proposer: AgentId,
        title: String,
        supersedes: Option<ProposalId>,
        timestamp: DateTime<Utc>,
    },

    /// Votes were collected for a proposal
    VotesCollected {
        proposal_id: ProposalId,
        votes: usize,
        fallbacks: usize,
        timestamp: DateTime<Utc>,
    },

    /// A consensus decision was produced
    ConsensusDecided {
        proposal_id: ProposalId,
        strategy: ConsensusStrategy,
        decision: VoteType,
        approval_ratio: f64,
        consensus_reached: bool,
        timestamp: DateTime<Utc>,
    },

    /// A negotiation round finished
    RoundCompleted {
        negotiation_id: NegotiationId,
        proposal_id: ProposalId,
        round: u32,
        support: usize,
        oppose: usize,
        counter_proposals: usize,
        support_ratio: f64,
        timestamp: DateTime<Utc>,
    },

    /// A negotiation reached a terminal status
    NegotiationConcluded {
        negotiation_id: NegotiationId,
        proposal_id: ProposalId,
        status: NegotiationStatus,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A task entered the queue
    TaskSubmitted {
        task_id: TaskId,
        priority: TaskPriority,
        dependencies: usize,
        timestamp: DateTime<Utc>,
    },

    /// A task was assigned to an agent
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        ranked_by_oracle: bool,
        timestamp: DateTime<Utc>,
    },

    /// A task finished, successfully or not
    TaskCompleted {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        success: bool,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// A task moved from an overloaded agent to an underloaded one
    TaskRedistributed {
        task_id: TaskId,
        from: AgentId,
        to: AgentId,
        urgency: Urgency,
        timestamp: DateTime<Utc>,
    },
}

impl CoordinationEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ProposalCreated { timestamp, .. }
            | Self::VotesCollected { timestamp, .. }
            | Self::ConsensusDecided { timestamp, .. }
            | Self::RoundCompleted { timestamp, .. }
            | Self::NegotiationConcluded { timestamp, .. }
            | Self::TaskSubmitted { timestamp, .. }
            | Self::TaskAssigned { timestamp, .. }
            | Self::TaskCompleted { timestamp, .. }
            | Self::TaskRedistributed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "proposal_created",
            Self::VotesCollected { .. } => "votes_collected",
            Self::ConsensusDecided { .. } => "consensus_decided",
            Self::RoundCompleted { .. } => "round_completed",
            Self::NegotiationConcluded { .. } => "negotiation_concluded",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskRedistributed { .. } => "task_redistributed",
        }
    }

    /// Proposal this event concerns, if any
    pub fn proposal_id(&self) -> Option<&str> {
        match self {
            Self::ProposalCreated { proposal_id, .. }
            | Self::VotesCollected { proposal_id, .. }
            | Self::ConsensusDecided { proposal_id, .. }
            | Self::RoundCompleted { proposal_id, .. }
            | Self::NegotiationConcluded { proposal_id, .. } => Some(proposal_id),
            _ => None,
        }
    }

    /// Task this event concerns, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { task_id, .. }
            | Self::TaskAssigned { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskRedistributed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Generate a new unique event ID
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}
