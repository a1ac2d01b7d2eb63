//! Drives a proposal through rounds of stances.
//!
//! Each round fans out one stance request per participant (except the
//! current proposer), tallies support, opposition and counter-proposals,
//! and either stops or carries on with the adopted counter-proposal.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::state::{
    NegotiationId, NegotiationRecord, NegotiationRound, NegotiationStatus, NegotiationTransition,
    Stance, StatusTransitionError,
};
use crate::agents::{AgentId, SharedRoster};
use crate::consensus::{ConsensusDecision, ConsensusStrategy, Vote, VoteTally, VoteType};
use crate::events::{CoordinationEvent, SharedEventBus};
use crate::oracle::{QueryKind, SharedOracle, StructuredQuery};
use crate::proposal::{Proposal, ProposalId, ProposalModifications, ProposalType};
use crate::store::Registry;

/// Benefit recorded when the oracle cannot draft a proposal.
pub const FALLBACK_BENEFIT: &str = "Addresses the stated requirement";
/// Risk recorded when the oracle cannot draft a proposal.
pub const FALLBACK_RISK: &str = "Unassessed implementation risk";

/// Configuration for negotiations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Round budget per negotiation
    pub max_rounds: u32,
    /// Support ratio at or above which consensus is reached
    pub consensus_threshold: f64,
    /// Support ratio below which a round without counters rejects
    pub rejection_threshold: f64,
    /// Stance assumed when a participant's evaluation cannot be parsed
    pub stance_fallback: Stance,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            consensus_threshold: 0.7,
            rejection_threshold: 0.3,
            stance_fallback: Stance::Support,
        }
    }
}

/// Errors from the negotiation coordinator.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Negotiation not found: {0}")]
    NegotiationNotFound(NegotiationId),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

/// Outcome of a finished negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub negotiation_id: NegotiationId,
    /// Proposal the negotiation started from
    pub proposal_id: ProposalId,
    pub status: NegotiationStatus,
    pub rounds: Vec<NegotiationRound>,
    /// Proposal agreed on; only set when consensus was reached
    pub final_proposal: Option<Proposal>,
    pub rationale: String,
    /// The single decision sealing this negotiation
    pub decision: ConsensusDecision,
    pub duration_ms: u64,
    pub transitions: Vec<NegotiationTransition>,
}

impl NegotiationResult {
    pub fn consensus_reached(&self) -> bool {
        self.status == NegotiationStatus::ConsensusReached
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} rounds | proposal={} | {}ms",
            self.status,
            self.rounds.len(),
            self.final_proposal
                .as_ref()
                .map(|p| p.id.as_str())
                .unwrap_or("-"),
            self.duration_ms
        )
    }
}

/// Read-only snapshot of coordinator state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationStatistics {
    pub proposals: usize,
    pub counter_proposals: usize,
    pub negotiations: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Mean rounds over finished negotiations
    pub average_rounds: f64,
    /// Share of finished negotiations that reached consensus
    pub consensus_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DraftAnswer {
    rationale: String,
    benefits: Vec<String>,
    risks: Vec<String>,
    impact: String,
    approach: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StanceAnswer {
    stance: String,
    #[serde(default)]
    argument: String,
    #[serde(default)]
    modifications: Option<ProposalModifications>,
}

#[derive(Debug, Clone, Deserialize)]
struct SelectionAnswer {
    proposal_id: String,
}

const DRAFT_SHAPE: &str = r#"{"rationale": string, "benefits": [string], "risks": [string], "impact": string, "approach": string}"#;
const STANCE_SHAPE: &str = r#"{"stance": "support" | "oppose" | "counter_propose", "argument": string, "modifications": {"title"?: string, "description"?: string, "rationale"?: string, "benefits"?: [string], "risks"?: [string], "approach"?: string}}"#;
const SELECTION_SHAPE: &str = r#"{"proposal_id": string}"#;

/// One participant's evaluation for a round.
#[derive(Debug, Clone)]
struct Evaluation {
    agent: AgentId,
    stance: Stance,
    argument: String,
    modifications: ProposalModifications,
    parsed: bool,
}

/// Runs negotiations over proposals it stores.
pub struct NegotiationCoordinator {
    oracle: SharedOracle,
    roster: SharedRoster,
    config: NegotiationConfig,
    proposals: Registry<Proposal>,
    negotiations: Registry<NegotiationRecord>,
    event_bus: Option<SharedEventBus>,
}

impl NegotiationCoordinator {
    pub fn new(oracle: SharedOracle, roster: SharedRoster, config: NegotiationConfig) -> Self {
        Self::with_registries(
            oracle,
            roster,
            config,
            Registry::new("proposal"),
            Registry::new("negotiation"),
        )
    }

    /// Create a coordinator over pre-populated registries.
    pub fn with_registries(
        oracle: SharedOracle,
        roster: SharedRoster,
        config: NegotiationConfig,
        proposals: Registry<Proposal>,
        negotiations: Registry<NegotiationRecord>,
    ) -> Self {
        Self {
            oracle,
            roster,
            config,
            proposals,
            negotiations,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Draft and store a new proposal.
    ///
    /// The oracle fills in rationale, benefits, risks, impact and approach.
    /// Without a usable answer the description doubles as rationale and a
    /// single generic benefit and risk are recorded.
    pub async fn propose(
        &mut self,
        proposer: &str,
        proposal_type: ProposalType,
        title: &str,
        description: &str,
        context: &serde_json::Value,
        required_approvers: &[AgentId],
    ) -> Proposal {
        let role = self.role_of(proposer);
        let query = StructuredQuery::new(
            QueryKind::DraftProposal,
            format!("You are the {} agent drafting a proposal.", role),
            serde_json::json!({
                "proposer": proposer,
                "type": proposal_type,
                "title": title,
                "description": description,
                "context": context,
            }),
            DRAFT_SHAPE,
            DraftAnswer {
                rationale: description.to_string(),
                benefits: vec![FALLBACK_BENEFIT.to_string()],
                risks: vec![FALLBACK_RISK.to_string()],
                ..Default::default()
            },
        );
        let (draft, drafted) = query.ask(self.oracle.as_ref()).await;

        let id = self.proposals.next_id();
        let mut proposal = Proposal::new(&id, proposer, proposal_type, title, description)
            .with_benefits(draft.benefits)
            .with_risks(draft.risks)
            .with_required_approvers(required_approvers.iter().cloned());
        if !draft.rationale.trim().is_empty() {
            proposal.rationale = draft.rationale;
        }
        proposal.impact = draft.impact;
        proposal.approach = draft.approach;

        info!(
            proposal_id = %proposal.id,
            proposer,
            proposal_type = %proposal.proposal_type,
            drafted,
            "Proposal created"
        );
        self.store_proposal(proposal.clone());
        proposal
    }

    /// Store an externally built proposal under a fresh id.
    pub fn register_proposal(&mut self, mut proposal: Proposal) -> Proposal {
        proposal.id = self.proposals.next_id();
        self.store_proposal(proposal.clone());
        proposal
    }

    /// Run a negotiation over a stored proposal.
    pub async fn negotiate(
        &mut self,
        proposal_id: &str,
        participants: &[AgentId],
        context: &serde_json::Value,
    ) -> Result<NegotiationResult, NegotiationError> {
        let started = Instant::now();
        let mut current = self
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.to_string()))?;

        let max_rounds = self.config.max_rounds;
        let mut record = NegotiationRecord::new(&self.negotiations.next_id(), proposal_id, max_rounds);
        record.transition(
            NegotiationStatus::UnderReview,
            &format!("{} participants", participants.len()),
        )?;
        info!(
            negotiation_id = %record.id,
            proposal_id,
            participants = participants.len(),
            max_rounds,
            "Negotiation started"
        );

        let mut last_evaluations: Vec<Evaluation> = Vec::new();
        let mut outcome: Option<(NegotiationStatus, String)> = None;

        for round_number in 1..=max_rounds {
            let round_started = Instant::now();
            let started_at = Utc::now();

            let evaluations = self
                .evaluate_round(&current, participants, round_number, &record, context)
                .await;

            let mut round = NegotiationRound {
                round: round_number,
                proposal_id: current.id.clone(),
                counter_proposals: Vec::new(),
                arguments_for: Vec::new(),
                arguments_against: Vec::new(),
                counter_arguments: Vec::new(),
                support_ratio: 0.0,
                fallback_stances: evaluations.iter().filter(|e| !e.parsed).count(),
                started_at,
                duration_ms: 0,
            };
            let mut counters: Vec<Proposal> = Vec::new();
            for evaluation in &evaluations {
                let entry = (evaluation.agent.clone(), evaluation.argument.clone());
                match evaluation.stance {
                    Stance::Support => round.arguments_for.push(entry),
                    Stance::Oppose => round.arguments_against.push(entry),
                    Stance::CounterPropose => {
                        let id = self.proposals.next_id();
                        let counter =
                            current.counter(&id, &evaluation.agent, &evaluation.modifications);
                        round.counter_proposals.push(id);
                        round.counter_arguments.push(entry);
                        counters.push(counter);
                    }
                }
            }
            for counter in &counters {
                self.store_proposal(counter.clone());
            }

            round.support_ratio = if participants.is_empty() {
                0.0
            } else {
                round.support() as f64 / participants.len() as f64
            };
            round.duration_ms = round_started.elapsed().as_millis() as u64;

            info!(
                negotiation_id = %record.id,
                round = round_number,
                proposal_id = %current.id,
                support = round.support(),
                oppose = round.opposition(),
                counter_proposals = counters.len(),
                support_ratio = round.support_ratio,
                "Round completed"
            );
            self.publish(CoordinationEvent::RoundCompleted {
                negotiation_id: record.id.clone(),
                proposal_id: current.id.clone(),
                round: round_number,
                support: round.support(),
                oppose: round.opposition(),
                counter_proposals: counters.len(),
                support_ratio: round.support_ratio,
                timestamp: Utc::now(),
            });

            let support_ratio = round.support_ratio;
            record.record_round(round);
            last_evaluations = evaluations;

            if support_ratio >= self.config.consensus_threshold {
                outcome = Some((
                    NegotiationStatus::ConsensusReached,
                    format!(
                        "Support {:.2} reached threshold {:.2} in round {}",
                        support_ratio, self.config.consensus_threshold, round_number
                    ),
                ));
                break;
            }

            if !counters.is_empty() {
                current = self.select_counter(&current, counters, context).await;
                record.current_proposal_id = current.id.clone();
                debug!(
                    negotiation_id = %record.id,
                    proposal_id = %current.id,
                    "Counter-proposal adopted"
                );
                continue;
            }

            if support_ratio < self.config.rejection_threshold {
                outcome = Some((
                    NegotiationStatus::Rejected,
                    format!(
                        "Support {:.2} fell below rejection threshold {:.2} in round {}",
                        support_ratio, self.config.rejection_threshold, round_number
                    ),
                ));
                break;
            }
        }

        let (status, rationale) = outcome.unwrap_or_else(|| budget_outcome(&record, max_rounds));
        record.transition(status, &rationale)?;

        let decision = sealing_decision(&record, &last_evaluations, status, &rationale);
        let final_proposal = (status == NegotiationStatus::ConsensusReached).then(|| current.clone());

        info!(
            negotiation_id = %record.id,
            status = %status,
            rounds = record.rounds_completed(),
            "Negotiation concluded"
        );
        self.publish(CoordinationEvent::NegotiationConcluded {
            negotiation_id: record.id.clone(),
            proposal_id: record.proposal_id.clone(),
            status,
            rounds: record.rounds_completed(),
            timestamp: Utc::now(),
        });
        self.publish(CoordinationEvent::ConsensusDecided {
            proposal_id: current.id.clone(),
            strategy: decision.strategy,
            decision: decision.decision,
            approval_ratio: decision.approval_ratio,
            consensus_reached: decision.consensus_reached,
            timestamp: decision.decided_at,
        });

        let result = NegotiationResult {
            negotiation_id: record.id.clone(),
            proposal_id: record.proposal_id.clone(),
            status,
            rounds: record.rounds.clone(),
            final_proposal,
            rationale,
            decision,
            duration_ms: started.elapsed().as_millis() as u64,
            transitions: record.transitions.clone(),
        };
        let id = record.id.clone();
        self.negotiations.put(&id, record);
        Ok(result)
    }

    /// Look up a stored proposal.
    pub fn proposal(&self, id: &str) -> Result<&Proposal, NegotiationError> {
        self.proposals
            .get(id)
            .ok_or_else(|| NegotiationError::ProposalNotFound(id.to_string()))
    }

    /// Look up a negotiation record.
    pub fn negotiation(&self, id: &str) -> Result<&NegotiationRecord, NegotiationError> {
        self.negotiations
            .get(id)
            .ok_or_else(|| NegotiationError::NegotiationNotFound(id.to_string()))
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn statistics(&self) -> NegotiationStatistics {
        let mut stats = NegotiationStatistics {
            proposals: self.proposals.len(),
            counter_proposals: self.proposals.values().filter(|p| p.is_counter()).count(),
            negotiations: self.negotiations.len(),
            ..Default::default()
        };

        let mut finished = 0usize;
        let mut rounds = 0u32;
        let mut reached = 0usize;
        for record in self.negotiations.values() {
            *stats.by_status.entry(record.status.to_string()).or_insert(0) += 1;
            if record.is_complete() {
                finished += 1;
                rounds += record.rounds_completed();
                if record.status == NegotiationStatus::ConsensusReached {
                    reached += 1;
                }
            }
        }
        if finished > 0 {
            stats.average_rounds = rounds as f64 / finished as f64;
            stats.consensus_rate = reached as f64 / finished as f64;
        }
        stats
    }

    async fn evaluate_round(
        &self,
        proposal: &Proposal,
        participants: &[AgentId],
        round: u32,
        record: &NegotiationRecord,
        context: &serde_json::Value,
    ) -> Vec<Evaluation> {
        let history: Vec<serde_json::Value> = record
            .rounds
            .iter()
            .map(|r| {
                serde_json::json!({
                    "round": r.round,
                    "proposal_id": r.proposal_id,
                    "support_ratio": r.support_ratio,
                    "arguments_against": r.arguments_against,
                })
            })
            .collect();

        let requests = participants
            .iter()
            .filter(|agent| **agent != proposal.proposer)
            .map(|agent| self.evaluate_stance(agent, proposal, round, &history, context));
        join_all(requests).await
    }

    async fn evaluate_stance(
        &self,
        agent: &str,
        proposal: &Proposal,
        round: u32,
        history: &[serde_json::Value],
        context: &serde_json::Value,
    ) -> Evaluation {
        let fallback = self.config.stance_fallback;
        let query = StructuredQuery::new(
            QueryKind::EvaluateStance,
            format!(
                "You are the {} agent reviewing a proposal in negotiation round {}.",
                self.role_of(agent),
                round
            ),
            serde_json::json!({
                "proposal": proposal.to_subject(),
                "round": round,
                "previous_rounds": history,
                "context": context,
            }),
            STANCE_SHAPE,
            StanceAnswer {
                stance: fallback.to_string(),
                argument: format!("No parseable evaluation; defaulting to {}", fallback),
                modifications: None,
            },
        );
        let (answer, ok) = query.ask(self.oracle.as_ref()).await;

        let (stance, parsed) = match Stance::parse(&answer.stance) {
            Some(stance) => (stance, ok),
            None => {
                warn!(agent, stance = %answer.stance, fallback = %fallback, "Unknown stance, using fallback");
                (fallback, false)
            }
        };
        let argument = if parsed || !ok {
            answer.argument
        } else {
            format!("Unrecognised stance '{}'; defaulting to {}", answer.stance, fallback)
        };

        Evaluation {
            agent: agent.to_string(),
            stance,
            argument,
            modifications: answer.modifications.unwrap_or_default(),
            parsed,
        }
    }

    /// Ask the oracle for the strongest counter-proposal. Falls back to the
    /// first one raised.
    async fn select_counter(
        &self,
        current: &Proposal,
        mut counters: Vec<Proposal>,
        context: &serde_json::Value,
    ) -> Proposal {
        if counters.len() == 1 {
            return counters.remove(0);
        }

        let candidates: Vec<serde_json::Value> = counters.iter().map(|c| c.to_subject()).collect();
        let query = StructuredQuery::new(
            QueryKind::SelectCounterProposal,
            "You are the facilitator choosing which counter-proposal to negotiate next.",
            serde_json::json!({
                "current": current.to_subject(),
                "counter_proposals": candidates,
                "context": context,
            }),
            SELECTION_SHAPE,
            SelectionAnswer {
                proposal_id: counters[0].id.clone(),
            },
        );
        let (answer, _) = query.ask(self.oracle.as_ref()).await;

        match counters.iter().position(|c| c.id == answer.proposal_id) {
            Some(index) => counters.swap_remove(index),
            None => {
                warn!(
                    proposal_id = %answer.proposal_id,
                    "Selected counter-proposal not among candidates, using the first"
                );
                counters.remove(0)
            }
        }
    }

    fn store_proposal(&mut self, proposal: Proposal) {
        self.publish(CoordinationEvent::ProposalCreated {
            proposal_id: proposal.id.clone(),
            proposer: proposal.proposer.clone(),
            title: proposal.title.clone(),
            supersedes: proposal.supersedes.clone(),
            timestamp: proposal.created_at,
        });
        let id = proposal.id.clone();
        self.proposals.put(&id, proposal);
    }

    fn role_of(&self, agent: &str) -> String {
        self.roster
            .get(agent)
            .map(|a| a.role_label().to_string())
            .unwrap_or_else(|| agent.to_string())
    }

    fn publish(&self, event: CoordinationEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}

/// Status once the round budget is spent without a stop.
fn budget_outcome(record: &NegotiationRecord, max_rounds: u32) -> (NegotiationStatus, String) {
    let Some(last) = record.last_round() else {
        return (
            NegotiationStatus::Stalemate,
            "No rounds were run".to_string(),
        );
    };

    if last.opposition() > last.support() {
        (
            NegotiationStatus::Rejected,
            format!(
                "Opposition {} outweighed support {} after {} rounds",
                last.opposition(),
                last.support(),
                max_rounds
            ),
        )
    } else if last.has_counter_proposals() {
        (
            NegotiationStatus::CounterProposed,
            format!(
                "{} counter-proposals unresolved after {} rounds",
                last.counter_proposals.len(),
                max_rounds
            ),
        )
    } else {
        (
            NegotiationStatus::Stalemate,
            format!(
                "Neither consensus nor rejection after {} rounds (support {:.2})",
                max_rounds, last.support_ratio
            ),
        )
    }
}

/// The one decision recorded per negotiation, over the final round's stances.
fn sealing_decision(
    record: &NegotiationRecord,
    evaluations: &[Evaluation],
    status: NegotiationStatus,
    rationale: &str,
) -> ConsensusDecision {
    let votes: Vec<Vote> = evaluations
        .iter()
        .map(|e| {
            let vote = match e.stance {
                Stance::Support => VoteType::Approve,
                Stance::Oppose => VoteType::Reject,
                Stance::CounterPropose => VoteType::Abstain,
            };
            let confidence = if e.parsed { 1.0 } else { 0.5 };
            Vote::new(&e.agent, vote, confidence).with_rationale(&e.argument)
        })
        .collect();

    let decision = match status {
        NegotiationStatus::ConsensusReached => VoteType::Approve,
        NegotiationStatus::Rejected => VoteType::Reject,
        _ => {
            let tally = VoteTally::of(&votes);
            if tally.reject > tally.approve {
                VoteType::Reject
            } else {
                VoteType::Abstain
            }
        }
    };
    let ratio = record.last_round().map(|r| r.support_ratio).unwrap_or(0.0);
    let proposal_id = record.current_proposal_id.clone();

    ConsensusDecision::new(
        ConsensusStrategy::Negotiated,
        votes,
        decision,
        status == NegotiationStatus::ConsensusReached,
        ratio,
        rationale.to_string(),
    )
    .for_proposal(&proposal_id)
}
