//! Vote collection and decision strategies.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{KeywordDomainClassifier, SharedClassifier};
use super::types::{ConsensusDecision, ConsensusStrategy, Vote, VoteTally, VoteType};
use crate::agents::{AgentId, SharedRoster};
use crate::events::{CoordinationEvent, SharedEventBus};
use crate::oracle::{QueryKind, SharedOracle, StructuredQuery};
use crate::proposal::Proposal;

/// Thresholds and defaults for the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Strategy used when the caller does not pick one
    pub default_strategy: ConsensusStrategy,
    /// Approval ratio that must be exceeded for simple majority
    pub simple_majority_threshold: f64,
    /// Approval ratio that must be exceeded for super-majority
    pub super_majority_threshold: f64,
    /// Weighted approval ratio that must be exceeded
    pub weighted_threshold: f64,
    /// Ratio that must be reached by the negotiated strategy
    pub negotiated_threshold: f64,
    /// Confidence given to the abstention recorded when a vote cannot be parsed
    pub fallback_vote_confidence: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_strategy: ConsensusStrategy::SimpleMajority,
            simple_majority_threshold: 0.5,
            super_majority_threshold: 0.66,
            weighted_threshold: 0.5,
            negotiated_threshold: 0.7,
            fallback_vote_confidence: 0.5,
        }
    }
}

/// Answer shape for [`QueryKind::CastVote`].
#[derive(Debug, Clone, Deserialize)]
struct VoteAnswer {
    vote: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Answer shape for [`QueryKind::ArbitrateDecision`].
#[derive(Debug, Clone, Deserialize)]
struct ArbitrationAnswer {
    decision: String,
    #[serde(default)]
    rationale: String,
}

const VOTE_SHAPE: &str = r#"{"vote": "approve" | "reject" | "abstain" | "veto", "confidence": number between 0 and 1, "rationale": string}"#;
const ARBITRATION_SHAPE: &str = r#"{"decision": "approve" | "reject", "rationale": string}"#;

/// Turns votes into decisions.
pub struct ConsensusEngine {
    oracle: SharedOracle,
    roster: SharedRoster,
    classifier: SharedClassifier,
    config: ConsensusConfig,
    event_bus: Option<SharedEventBus>,
}

impl ConsensusEngine {
    /// Create an engine with the keyword domain classifier.
    pub fn new(oracle: SharedOracle, roster: SharedRoster, config: ConsensusConfig) -> Self {
        Self {
            oracle,
            roster,
            classifier: KeywordDomainClassifier::default().shared(),
            config,
            event_bus: None,
        }
    }

    /// Replace the domain classifier used by the weighted strategy.
    pub fn with_classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Publish decisions on an event bus.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Ask every voter for a vote, concurrently.
    ///
    /// One oracle call per voter. A voter whose answer cannot be parsed
    /// abstains with the fallback confidence; this never fails.
    pub async fn collect_votes(
        &self,
        proposal: &Proposal,
        voters: &[AgentId],
        context: &serde_json::Value,
    ) -> Vec<Vote> {
        let requests = voters
            .iter()
            .map(|voter| self.request_vote(proposal, voter, context));
        let results = join_all(requests).await;

        let fallbacks = results.iter().filter(|(_, ok)| !ok).count();
        let votes: Vec<Vote> = results.into_iter().map(|(vote, _)| vote).collect();

        info!(
            proposal_id = %proposal.id,
            votes = votes.len(),
            fallbacks,
            "Votes collected"
        );

        self.publish(CoordinationEvent::VotesCollected {
            proposal_id: proposal.id.clone(),
            votes: votes.len(),
            fallbacks,
            timestamp: chrono::Utc::now(),
        });

        votes
    }

    async fn request_vote(
        &self,
        proposal: &Proposal,
        voter: &str,
        context: &serde_json::Value,
    ) -> (Vote, bool) {
        let agent = self.roster.get(voter);
        let role = agent.map(|a| a.role_label()).unwrap_or(voter);
        let expertise = agent
            .map(|a| serde_json::to_value(&a.expertise).unwrap_or_default())
            .unwrap_or_default();

        let fallback_confidence = self.config.fallback_vote_confidence;
        let query = StructuredQuery::new(
            QueryKind::CastVote,
            format!("You are the {} agent voting on a proposal.", role),
            serde_json::json!({
                "proposal": proposal.to_subject(),
                "voter": voter,
                "expertise": expertise,
                "context": context,
            }),
            VOTE_SHAPE,
            VoteAnswer {
                vote: VoteType::Abstain.to_string(),
                confidence: Some(fallback_confidence),
                rationale: Some("No parseable judgment; abstaining by default".to_string()),
            },
        );

        let (answer, ok) = query.ask(self.oracle.as_ref()).await;
        let vote = Vote::new(
            voter,
            VoteType::from_str_lenient(&answer.vote),
            answer.confidence.unwrap_or(fallback_confidence),
        )
        .with_rationale(answer.rationale.as_deref().unwrap_or_default());

        debug!(voter, vote = %vote.vote, confidence = vote.confidence, parsed = ok, "Vote recorded");
        (vote, ok)
    }

    /// Decide on a proposal under `strategy`.
    pub async fn reach_consensus(
        &self,
        proposal: &Proposal,
        votes: Vec<Vote>,
        strategy: ConsensusStrategy,
        context: &serde_json::Value,
    ) -> ConsensusDecision {
        let decision = match strategy {
            ConsensusStrategy::SimpleMajority => majority_decision(
                votes,
                ConsensusStrategy::SimpleMajority,
                self.config.simple_majority_threshold,
            ),
            ConsensusStrategy::SuperMajority => majority_decision(
                votes,
                ConsensusStrategy::SuperMajority,
                self.config.super_majority_threshold,
            ),
            ConsensusStrategy::Unanimous => unanimous_decision(votes),
            ConsensusStrategy::Weighted => self.weighted_decision(proposal, votes),
            ConsensusStrategy::OracleArbitration => {
                self.arbitrated_decision(proposal, votes, context).await
            }
            ConsensusStrategy::Negotiated => {
                support_threshold_decision(votes, self.config.negotiated_threshold)
            }
        }
        .for_proposal(&proposal.id);

        info!(
            proposal_id = %proposal.id,
            strategy = %decision.strategy,
            decision = %decision.decision,
            approval_ratio = decision.approval_ratio,
            consensus_reached = decision.consensus_reached,
            "Consensus decision"
        );

        self.publish(CoordinationEvent::ConsensusDecided {
            proposal_id: proposal.id.clone(),
            strategy: decision.strategy,
            decision: decision.decision,
            approval_ratio: decision.approval_ratio,
            consensus_reached: decision.consensus_reached,
            timestamp: decision.decided_at,
        });

        decision
    }

    /// Collect votes from `voters` and decide with the configured default strategy.
    pub async fn vote_on(
        &self,
        proposal: &Proposal,
        voters: &[AgentId],
        context: &serde_json::Value,
    ) -> ConsensusDecision {
        let votes = self.collect_votes(proposal, voters, context).await;
        self.reach_consensus(proposal, votes, self.config.default_strategy, context)
            .await
    }

    /// Expertise-weighted approval.
    pub fn weighted_decision(&self, proposal: &Proposal, votes: Vec<Vote>) -> ConsensusDecision {
        if let Some(decision) = veto_decision(&votes, ConsensusStrategy::Weighted) {
            return decision;
        }

        let domain = self.classifier.classify(proposal);
        let mut approve_weight = 0.0;
        let mut total_weight = 0.0;
        for vote in votes.iter().filter(|v| v.vote.is_active()) {
            let weight = self.roster.domain_weight(&vote.voter, &domain) * vote.confidence * vote.weight;
            total_weight += weight;
            if vote.vote == VoteType::Approve {
                approve_weight += weight;
            }
        }

        if total_weight <= 0.0 {
            return ConsensusDecision::new(
                ConsensusStrategy::Weighted,
                votes,
                VoteType::Abstain,
                false,
                0.0,
                format!("No weighted votes in domain '{}'", domain),
            );
        }

        let ratio = approve_weight / total_weight;
        let reached = ratio > self.config.weighted_threshold;
        let decision = if reached {
            VoteType::Approve
        } else {
            VoteType::Reject
        };
        ConsensusDecision::new(
            ConsensusStrategy::Weighted,
            votes,
            decision,
            reached,
            ratio,
            format!(
                "Weighted approval {:.3} ({:.3}/{:.3}) in domain '{}'",
                ratio, approve_weight, total_weight, domain
            ),
        )
    }

    async fn arbitrated_decision(
        &self,
        proposal: &Proposal,
        votes: Vec<Vote>,
        context: &serde_json::Value,
    ) -> ConsensusDecision {
        let query: StructuredQuery<Option<ArbitrationAnswer>> = StructuredQuery::new(
            QueryKind::ArbitrateDecision,
            "You are the arbiter settling a vote among specialist agents.",
            serde_json::json!({
                "proposal": proposal.to_subject(),
                "votes": votes,
                "context": context,
            }),
            ARBITRATION_SHAPE,
            None,
        );

        let (answer, _) = query.ask(self.oracle.as_ref()).await;
        let ruling = answer.and_then(|a| parse_binary_decision(&a.decision).map(|d| (d, a.rationale)));

        match ruling {
            Some((decision, rationale)) => {
                let tally = VoteTally::of(&votes);
                let ratio = if tally.active() == 0 {
                    0.0
                } else {
                    tally.approve as f64 / tally.active() as f64
                };
                let rationale = if rationale.is_empty() {
                    format!("Oracle ruled {}", decision)
                } else {
                    rationale
                };
                let mut decided = ConsensusDecision::new(
                    ConsensusStrategy::OracleArbitration,
                    votes,
                    decision,
                    true,
                    ratio,
                    rationale,
                );
                decided.tie_broken_by_oracle = true;
                decided
            }
            None => {
                debug!(proposal_id = %proposal.id, "Arbitration unavailable, falling back to simple majority");
                let mut decided = majority_decision(
                    votes,
                    ConsensusStrategy::SimpleMajority,
                    self.config.simple_majority_threshold,
                );
                decided.strategy = ConsensusStrategy::OracleArbitration;
                decided.rationale = format!("Arbitration failed; {}", decided.rationale);
                decided
            }
        }
    }

    fn publish(&self, event: CoordinationEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}

/// Parse an arbitration ruling. Only approve/reject are accepted.
fn parse_binary_decision(s: &str) -> Option<VoteType> {
    match VoteType::from_str_lenient(s) {
        VoteType::Approve => Some(VoteType::Approve),
        VoteType::Reject => Some(VoteType::Reject),
        _ => None,
    }
}

/// Rejection forced by vetoes, when `strategy` honors them and any vote is
/// a veto.
fn veto_decision(votes: &[Vote], strategy: ConsensusStrategy) -> Option<ConsensusDecision> {
    if !strategy.honors_veto() {
        return None;
    }
    let vetoers: Vec<&str> = votes
        .iter()
        .filter(|v| v.vote == VoteType::Veto)
        .map(|v| v.voter.as_str())
        .collect();
    if vetoers.is_empty() {
        return None;
    }
    Some(ConsensusDecision::new(
        strategy,
        votes.to_vec(),
        VoteType::Reject,
        false,
        0.0,
        format!("Vetoed by {}", vetoers.join(", ")),
    ))
}

/// Simple or super majority: approvals over approve/reject votes must exceed
/// `threshold`. Any veto rejects outright.
pub fn majority_decision(
    votes: Vec<Vote>,
    strategy: ConsensusStrategy,
    threshold: f64,
) -> ConsensusDecision {
    if let Some(decision) = veto_decision(&votes, strategy) {
        return decision;
    }

    let tally = VoteTally::of(&votes);
    if tally.active() == 0 {
        return ConsensusDecision::new(
            strategy,
            votes,
            VoteType::Abstain,
            false,
            0.0,
            "No approve or reject votes".to_string(),
        );
    }

    let ratio = tally.approve as f64 / tally.active() as f64;
    let reached = ratio > threshold;
    let decision = if reached {
        VoteType::Approve
    } else {
        VoteType::Reject
    };
    ConsensusDecision::new(
        strategy,
        votes,
        decision,
        reached,
        ratio,
        format!(
            "{}/{} approved ({:.3}, needs > {:.2})",
            tally.approve,
            tally.active(),
            ratio,
            threshold
        ),
    )
}

/// Every non-abstaining vote must approve. A veto simply fails unanimity.
pub fn unanimous_decision(votes: Vec<Vote>) -> ConsensusDecision {
    let remaining: Vec<&Vote> = votes
        .iter()
        .filter(|v| v.vote != VoteType::Abstain)
        .collect();
    if remaining.is_empty() {
        return ConsensusDecision::new(
            ConsensusStrategy::Unanimous,
            votes,
            VoteType::Abstain,
            false,
            0.0,
            "All votes abstained".to_string(),
        );
    }

    let dissenters: Vec<String> = remaining
        .iter()
        .filter(|v| v.vote != VoteType::Approve)
        .map(|v| format!("{} ({})", v.voter, v.vote))
        .collect();

    if dissenters.is_empty() {
        let count = remaining.len();
        ConsensusDecision::new(
            ConsensusStrategy::Unanimous,
            votes,
            VoteType::Approve,
            true,
            1.0,
            format!("Unanimous approval from {} voters", count),
        )
    } else {
        ConsensusDecision::new(
            ConsensusStrategy::Unanimous,
            votes,
            VoteType::Reject,
            false,
            0.0,
            format!("Unanimity broken by {}", dissenters.join(", ")),
        )
    }
}

/// Approvals over all votes (abstentions included) must reach `threshold`.
pub fn support_threshold_decision(votes: Vec<Vote>, threshold: f64) -> ConsensusDecision {
    let tally = VoteTally::of(&votes);
    if tally.total() == 0 {
        return ConsensusDecision::new(
            ConsensusStrategy::Negotiated,
            votes,
            VoteType::Abstain,
            false,
            0.0,
            "No participants".to_string(),
        );
    }

    let ratio = tally.approve as f64 / tally.total() as f64;
    let reached = ratio >= threshold;
    let decision = if reached {
        VoteType::Approve
    } else if tally.reject + tally.veto > tally.approve {
        VoteType::Reject
    } else {
        VoteType::Abstain
    };
    ConsensusDecision::new(
        ConsensusStrategy::Negotiated,
        votes,
        decision,
        reached,
        ratio,
        format!(
            "{}/{} in support ({:.3}, needs >= {:.2})",
            tally.approve,
            tally.total(),
            ratio,
            threshold
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Agent, AgentRoster};
    use crate::consensus::domain::FixedDomainClassifier;
    use crate::oracle::{MockReasoningOracle, OfflineOracle, OracleError};
    use crate::proposal::ProposalType;
    use std::sync::Arc;

    fn roster() -> SharedRoster {
        AgentRoster::new(vec![
            Agent::new("security", "Security").with_expertise("security", 0.9),
            Agent::new("performance", "Performance").with_expertise("performance", 0.8),
            Agent::new("architect", "Architect").with_expertise("security", 0.3),
        ])
        .shared()
    }

    fn proposal() -> Proposal {
        Proposal::new(
            "proposal-1",
            "architect",
            ProposalType::Architecture,
            "Harden authentication",
            "Require MFA for admin accounts",
        )
    }

    fn offline_engine() -> ConsensusEngine {
        ConsensusEngine::new(OfflineOracle::shared(), roster(), ConsensusConfig::default())
    }

    fn engine_with(oracle: MockReasoningOracle) -> ConsensusEngine {
        ConsensusEngine::new(Arc::new(oracle), roster(), ConsensusConfig::default())
    }

    #[test]
    fn test_simple_majority_scenario() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.8),
            Vote::new("b", VoteType::Approve, 0.9),
            Vote::new("c", VoteType::Reject, 0.5),
        ];
        let decision = majority_decision(votes, ConsensusStrategy::SimpleMajority, 0.5);
        assert_eq!(decision.decision, VoteType::Approve);
        assert!(decision.consensus_reached);
        assert!((decision.approval_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_majority_tie_is_not_consensus() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.8),
            Vote::new("b", VoteType::Reject, 0.8),
            Vote::new("c", VoteType::Abstain, 0.5),
        ];
        let decision = majority_decision(votes, ConsensusStrategy::SimpleMajority, 0.5);
        assert_eq!(decision.decision, VoteType::Reject);
        assert!(!decision.consensus_reached);
        assert!((decision.approval_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_super_majority_threshold() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.8),
            Vote::new("b", VoteType::Approve, 0.9),
            Vote::new("c", VoteType::Reject, 0.5),
        ];
        let decision = majority_decision(votes, ConsensusStrategy::SuperMajority, 0.66);
        assert!(decision.consensus_reached);

        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.8),
            Vote::new("b", VoteType::Approve, 0.9),
            Vote::new("c", VoteType::Reject, 0.5),
            Vote::new("d", VoteType::Reject, 0.5),
        ];
        let decision = majority_decision(votes, ConsensusStrategy::SuperMajority, 0.66);
        assert!(!decision.consensus_reached);
        assert_eq!(decision.decision, VoteType::Reject);
    }

    #[test]
    fn test_veto_rejects_majority_and_names_vetoers() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 1.0),
            Vote::new("b", VoteType::Approve, 1.0),
            Vote::new("security", VoteType::Veto, 0.9),
        ];
        for strategy in [ConsensusStrategy::SimpleMajority, ConsensusStrategy::SuperMajority] {
            let decision = majority_decision(votes.clone(), strategy, 0.5);
            assert_eq!(decision.decision, VoteType::Reject);
            assert_eq!(decision.approval_ratio, 0.0);
            assert!(decision.rationale.contains("security"));
        }
    }

    #[test]
    fn test_veto_short_circuit_only_for_veto_strategies() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 1.0),
            Vote::new("security", VoteType::Veto, 0.9),
        ];
        for strategy in [
            ConsensusStrategy::SimpleMajority,
            ConsensusStrategy::SuperMajority,
            ConsensusStrategy::Weighted,
        ] {
            assert!(veto_decision(&votes, strategy).is_some(), "{}", strategy);
        }
        for strategy in [
            ConsensusStrategy::Unanimous,
            ConsensusStrategy::OracleArbitration,
            ConsensusStrategy::Negotiated,
        ] {
            assert!(veto_decision(&votes, strategy).is_none(), "{}", strategy);
        }
    }

    #[test]
    fn test_all_abstain_majority() {
        let votes = vec![Vote::new("a", VoteType::Abstain, 0.5)];
        let decision = majority_decision(votes, ConsensusStrategy::SimpleMajority, 0.5);
        assert_eq!(decision.decision, VoteType::Abstain);
        assert!(!decision.consensus_reached);
    }

    #[test]
    fn test_unanimous() {
        let approve_all = vec![
            Vote::new("a", VoteType::Approve, 0.6),
            Vote::new("b", VoteType::Abstain, 0.5),
            Vote::new("c", VoteType::Approve, 0.7),
        ];
        let decision = unanimous_decision(approve_all);
        assert_eq!(decision.decision, VoteType::Approve);
        assert!(decision.consensus_reached);
        assert_eq!(decision.approval_ratio, 1.0);

        let with_veto = vec![
            Vote::new("a", VoteType::Approve, 0.6),
            Vote::new("b", VoteType::Veto, 0.9),
        ];
        let decision = unanimous_decision(with_veto);
        assert_eq!(decision.decision, VoteType::Reject);
        assert!(!decision.consensus_reached);
        assert_eq!(decision.approval_ratio, 0.0);
        assert!(decision.rationale.contains("b (veto)"));

        let all_abstain = vec![
            Vote::new("a", VoteType::Abstain, 0.5),
            Vote::new("b", VoteType::Abstain, 0.5),
        ];
        let decision = unanimous_decision(all_abstain);
        assert_eq!(decision.decision, VoteType::Abstain);
        assert!(!decision.consensus_reached);
    }

    #[test]
    fn test_weighted_ratio() {
        let engine = offline_engine()
            .with_classifier(Arc::new(FixedDomainClassifier("security".to_string())));
        let votes = vec![
            Vote::new("security", VoteType::Approve, 1.0),   // 0.9
            Vote::new("performance", VoteType::Reject, 0.5), // 0.5 * 0.5 = 0.25
            Vote::new("architect", VoteType::Reject, 1.0).with_weight(2.0), // 0.3 * 2 = 0.6
            Vote::new("unknown", VoteType::Abstain, 1.0),
        ];
        let decision = engine.weighted_decision(&proposal(), votes);
        let expected = 0.9 / (0.9 + 0.25 + 0.6);
        assert!((decision.approval_ratio - expected).abs() < 1e-9);
        assert!(decision.consensus_reached);
        assert_eq!(decision.decision, VoteType::Approve);
        assert!(decision.rationale.contains("security"));
    }

    #[test]
    fn test_weighted_all_approve_is_one() {
        let engine = offline_engine();
        let votes = vec![
            Vote::new("security", VoteType::Approve, 0.4),
            Vote::new("performance", VoteType::Approve, 0.9),
        ];
        let decision = engine.weighted_decision(&proposal(), votes);
        assert!((decision.approval_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_veto_and_zero_weight() {
        let engine = offline_engine();
        let decision = engine.weighted_decision(
            &proposal(),
            vec![
                Vote::new("security", VoteType::Approve, 1.0),
                Vote::new("performance", VoteType::Veto, 0.2),
            ],
        );
        assert_eq!(decision.decision, VoteType::Reject);
        assert_eq!(decision.approval_ratio, 0.0);

        let decision = engine.weighted_decision(
            &proposal(),
            vec![Vote::new("security", VoteType::Approve, 0.0)],
        );
        assert_eq!(decision.decision, VoteType::Abstain);
        assert!(!decision.consensus_reached);
    }

    #[test]
    fn test_support_threshold_decision() {
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.5),
            Vote::new("b", VoteType::Approve, 0.5),
            Vote::new("c", VoteType::Approve, 0.5),
            Vote::new("d", VoteType::Reject, 0.5),
        ];
        let decision = support_threshold_decision(votes, 0.7);
        assert!(decision.consensus_reached);
        assert!((decision.approval_ratio - 0.75).abs() < 1e-9);

        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.5),
            Vote::new("b", VoteType::Abstain, 0.5),
        ];
        let decision = support_threshold_decision(votes, 0.7);
        assert_eq!(decision.decision, VoteType::Abstain);
        assert!(!decision.consensus_reached);
    }

    #[tokio::test]
    async fn test_collect_votes_offline_abstains() {
        let engine = offline_engine();
        let voters = vec!["security".to_string(), "performance".to_string()];
        let votes = engine
            .collect_votes(&proposal(), &voters, &serde_json::json!({}))
            .await;
        assert_eq!(votes.len(), 2);
        for vote in &votes {
            assert_eq!(vote.vote, VoteType::Abstain);
            assert!((vote.confidence - 0.5).abs() < 1e-9);
        }
        assert_eq!(votes[0].voter, "security");
        assert_eq!(votes[1].voter, "performance");
    }

    #[tokio::test]
    async fn test_collect_votes_parses_and_coerces() {
        let mut oracle = MockReasoningOracle::new();
        oracle.expect_query().times(2).returning(|req| {
            if req.subject["voter"] == "security" {
                Ok(serde_json::json!({"vote": "VETO", "confidence": 0.95, "rationale": "No MFA backup"}))
            } else {
                Ok(serde_json::json!({"vote": "probably fine"}))
            }
        });
        let engine = engine_with(oracle);
        let voters = vec!["security".to_string(), "performance".to_string()];
        let votes = engine
            .collect_votes(&proposal(), &voters, &serde_json::json!({}))
            .await;
        assert_eq!(votes[0].vote, VoteType::Veto);
        assert_eq!(votes[0].rationale, "No MFA backup");
        assert_eq!(votes[1].vote, VoteType::Abstain);
        assert!((votes[1].confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_oracle_arbitration_success() {
        let mut oracle = MockReasoningOracle::new();
        oracle
            .expect_query()
            .withf(|req| req.kind == QueryKind::ArbitrateDecision)
            .times(1)
            .returning(|_| Ok(serde_json::json!({"decision": "reject", "rationale": "Risk too high"})));
        let engine = engine_with(oracle);
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.9),
            Vote::new("b", VoteType::Reject, 0.9),
        ];
        let decision = engine
            .reach_consensus(
                &proposal(),
                votes,
                ConsensusStrategy::OracleArbitration,
                &serde_json::json!({}),
            )
            .await;
        assert_eq!(decision.decision, VoteType::Reject);
        assert!(decision.tie_broken_by_oracle);
        assert!(decision.consensus_reached);
        assert_eq!(decision.rationale, "Risk too high");
        assert_eq!(decision.proposal_id.as_deref(), Some("proposal-1"));
    }

    #[tokio::test]
    async fn test_oracle_arbitration_falls_back_to_majority() {
        let mut oracle = MockReasoningOracle::new();
        oracle
            .expect_query()
            .times(1)
            .returning(|_| Ok(serde_json::json!({"decision": "let me think"})));
        let engine = engine_with(oracle);
        let votes = vec![
            Vote::new("a", VoteType::Approve, 0.9),
            Vote::new("b", VoteType::Approve, 0.9),
            Vote::new("c", VoteType::Reject, 0.9),
        ];
        let decision = engine
            .reach_consensus(
                &proposal(),
                votes,
                ConsensusStrategy::OracleArbitration,
                &serde_json::json!({}),
            )
            .await;
        assert_eq!(decision.decision, VoteType::Approve);
        assert!(!decision.tie_broken_by_oracle);
        assert!(decision.rationale.starts_with("Arbitration failed"));
    }

    #[tokio::test]
    async fn test_oracle_arbitration_request_error() {
        let mut oracle = MockReasoningOracle::new();
        oracle
            .expect_query()
            .times(1)
            .returning(|_| Err(OracleError::Unavailable("down".to_string())));
        let engine = engine_with(oracle);
        let decision = engine
            .reach_consensus(
                &proposal(),
                vec![Vote::new("a", VoteType::Abstain, 0.5)],
                ConsensusStrategy::OracleArbitration,
                &serde_json::json!({}),
            )
            .await;
        assert_eq!(decision.decision, VoteType::Abstain);
        assert!(!decision.tie_broken_by_oracle);
    }

    #[tokio::test]
    async fn test_vote_on_uses_default_strategy() {
        let engine = ConsensusEngine::new(
            OfflineOracle::shared(),
            roster(),
            ConsensusConfig {
                default_strategy: ConsensusStrategy::Unanimous,
                ..Default::default()
            },
        );
        let decision = engine
            .vote_on(&proposal(), &["security".to_string()], &serde_json::json!({}))
            .await;
        assert_eq!(decision.strategy, ConsensusStrategy::Unanimous);
        assert_eq!(decision.decision, VoteType::Abstain);
    }
}
