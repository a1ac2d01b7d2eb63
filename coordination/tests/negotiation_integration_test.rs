//! Multi-round negotiations driven by a scripted oracle.
//!
//! Covers: counter-proposal adoption, the support ratio over all
//! participants, every stop condition, and the sealing decision.

mod common;

use agent_coordination::negotiation::{FALLBACK_BENEFIT, FALLBACK_RISK};
use agent_coordination::{
    ConsensusStrategy, EventBus, NegotiationConfig, NegotiationCoordinator, NegotiationError,
    NegotiationStatus, OfflineOracle, ProposalType, QueryKind, Stance, VoteType,
};
use common::{ids, is_kind, roster, round_of, shared, speaks_as, stance, ScriptedOracle};

async fn coordinator_with_proposal(
    oracle: agent_coordination::SharedOracle,
    config: NegotiationConfig,
) -> (NegotiationCoordinator, String) {
    let mut coordinator = NegotiationCoordinator::new(oracle, roster(), config);
    let proposal = coordinator
        .propose(
            "architect",
            ProposalType::Architecture,
            "Cache catalog reads",
            "Add a 60s read-through cache in front of the catalog",
            &serde_json::json!({ "service": "catalog" }),
            &ids(&["security"]),
        )
        .await;
    (coordinator, proposal.id)
}

// ── Two rounds to consensus through a counter-proposal ─────────────

/// Round 1: security and performance support, qa counter-proposes, ops
/// opposes (2/4). Round 2 runs on qa's counter, so qa sits out and the
/// remaining three support (3/4).
fn two_round_oracle() -> std::sync::Arc<ScriptedOracle> {
    ScriptedOracle::new(|req| {
        if !is_kind(req, QueryKind::EvaluateStance) {
            return None;
        }
        let round = round_of(req);
        if speaks_as(req, "Test engineer") && round == 1 {
            return Some(serde_json::json!({
                "stance": "counter_propose",
                "argument": "Needs per-tenant keys",
                "modifications": {
                    "title": "Cache catalog reads with per-tenant keys",
                    "risks": ["Lower hit rate"]
                }
            }));
        }
        if speaks_as(req, "Operations engineer") && round == 1 {
            return Some(stance("oppose", "Another moving part to run"));
        }
        Some(stance("support", "Looks good"))
    })
}

#[tokio::test]
async fn test_counter_proposal_reaches_consensus_in_second_round() {
    let oracle = two_round_oracle();
    let bus = EventBus::with_history(128).shared();
    let (coordinator, proposal_id) =
        coordinator_with_proposal(shared(&oracle), NegotiationConfig::default()).await;
    let mut coordinator = coordinator.with_event_bus(bus.clone());
    let participants = ids(&["security", "performance", "qa", "ops"]);

    let result = coordinator
        .negotiate(&proposal_id, &participants, &serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, NegotiationStatus::ConsensusReached);
    assert_eq!(result.rounds_completed(), 2);

    let first = &result.rounds[0];
    assert_eq!(first.proposal_id, proposal_id);
    assert_eq!(first.support(), 2);
    assert_eq!(first.opposition(), 1);
    assert_eq!(first.counter_proposals.len(), 1);
    assert!((first.support_ratio - 0.5).abs() < 1e-9);

    let second = &result.rounds[1];
    assert_eq!(second.proposal_id, first.counter_proposals[0]);
    assert_eq!(second.support(), 3);
    assert!((second.support_ratio - 0.75).abs() < 1e-9);

    let adopted = result.final_proposal.as_ref().unwrap();
    assert_eq!(adopted.proposer, "qa");
    assert_eq!(adopted.supersedes.as_deref(), Some(proposal_id.as_str()));
    assert_eq!(adopted.title, "Cache catalog reads with per-tenant keys");
    assert_eq!(adopted.risks, vec!["Lower hit rate".to_string()]);
    assert!(coordinator.proposal(&adopted.id).is_ok());

    let decision = &result.decision;
    assert_eq!(decision.strategy, ConsensusStrategy::Negotiated);
    assert_eq!(decision.decision, VoteType::Approve);
    assert!(decision.consensus_reached);
    assert!((decision.approval_ratio - 0.75).abs() < 1e-9);
    assert_eq!(decision.votes.len(), 3);

    let record = coordinator.negotiation(&result.negotiation_id).unwrap();
    assert_eq!(record.current_proposal_id, adopted.id);
    assert!(record.is_complete());

    let stats = coordinator.statistics();
    assert_eq!(stats.proposals, 2);
    assert_eq!(stats.counter_proposals, 1);
    assert_eq!(stats.negotiations, 1);
    assert!((stats.consensus_rate - 1.0).abs() < 1e-9);

    let counts = bus.stats().event_types;
    assert_eq!(counts.get("round_completed"), Some(&2));
    assert_eq!(counts.get("negotiation_concluded"), Some(&1));
}

// ── Stop conditions ─────────────────────────────────────────────────

#[tokio::test]
async fn test_broad_opposition_rejects_in_first_round() {
    let oracle = ScriptedOracle::new(|req| {
        is_kind(req, QueryKind::EvaluateStance).then(|| stance("oppose", "Not worth it"))
    });
    let (mut coordinator, proposal_id) =
        coordinator_with_proposal(shared(&oracle), NegotiationConfig::default()).await;

    let result = coordinator
        .negotiate(&proposal_id, &ids(&["security", "performance", "qa"]), &serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, NegotiationStatus::Rejected);
    assert_eq!(result.rounds_completed(), 1);
    assert!(result.final_proposal.is_none());
    assert_eq!(result.decision.decision, VoteType::Reject);
    assert!(!result.decision.consensus_reached);
}

#[tokio::test]
async fn test_split_panel_stalls_when_budget_runs_out() {
    let oracle = ScriptedOracle::new(|req| {
        if !is_kind(req, QueryKind::EvaluateStance) {
            return None;
        }
        if speaks_as(req, "Security reviewer") {
            Some(stance("support", "Fine by me"))
        } else {
            Some(stance("oppose", "Not convinced"))
        }
    });
    let config = NegotiationConfig {
        max_rounds: 3,
        rejection_threshold: 0.2,
        ..Default::default()
    };
    let (mut coordinator, proposal_id) = coordinator_with_proposal(shared(&oracle), config).await;

    // 1 support, 1 oppose out of 2: above rejection, below consensus
    let result = coordinator
        .negotiate(&proposal_id, &ids(&["security", "ops"]), &serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, NegotiationStatus::Stalemate);
    assert_eq!(result.rounds_completed(), 3);
    assert_eq!(result.decision.decision, VoteType::Abstain);
    assert!((result.decision.approval_ratio - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_unresolved_counters_end_counter_proposed() {
    // Two agents keep countering each other's revisions
    let oracle = ScriptedOracle::new(|req| {
        if !is_kind(req, QueryKind::EvaluateStance) {
            return None;
        }
        if speaks_as(req, "Security reviewer") || speaks_as(req, "Test engineer") {
            Some(serde_json::json!({
                "stance": "counter_propose",
                "argument": format!("Revision for round {}", round_of(req)),
            }))
        } else {
            Some(stance("support", "Either way"))
        }
    });
    let config = NegotiationConfig {
        max_rounds: 2,
        ..Default::default()
    };
    let (mut coordinator, proposal_id) = coordinator_with_proposal(shared(&oracle), config).await;

    let result = coordinator
        .negotiate(&proposal_id, &ids(&["security", "qa", "ops"]), &serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, NegotiationStatus::CounterProposed);
    assert_eq!(result.rounds_completed(), 2);
    assert!(result.rounds.iter().all(|r| r.has_counter_proposals()));
    assert!(coordinator.statistics().counter_proposals >= 3);
}

// ── Oracle fallbacks ────────────────────────────────────────────────

#[tokio::test]
async fn test_offline_oracle_uses_drafting_and_stance_fallbacks() {
    let (mut coordinator, proposal_id) =
        coordinator_with_proposal(OfflineOracle::shared(), NegotiationConfig::default()).await;

    let proposal = coordinator.proposal(&proposal_id).unwrap().clone();
    assert_eq!(proposal.benefits, vec![FALLBACK_BENEFIT.to_string()]);
    assert_eq!(proposal.risks, vec![FALLBACK_RISK.to_string()]);
    assert_eq!(proposal.rationale, proposal.description);

    let result = coordinator
        .negotiate(&proposal_id, &ids(&["security", "performance"]), &serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(result.status, NegotiationStatus::ConsensusReached);
    assert_eq!(result.rounds[0].fallback_stances, 2);
    assert!(result
        .decision
        .votes
        .iter()
        .all(|v| (v.confidence - 0.5).abs() < 1e-9));
}

#[tokio::test]
async fn test_oppose_fallback_rejects_offline() {
    let config = NegotiationConfig {
        stance_fallback: Stance::Oppose,
        ..Default::default()
    };
    let (mut coordinator, proposal_id) =
        coordinator_with_proposal(OfflineOracle::shared(), config).await;

    let result = coordinator
        .negotiate(&proposal_id, &ids(&["security", "performance"]), &serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(result.status, NegotiationStatus::Rejected);
}

#[tokio::test]
async fn test_unknown_proposal_is_an_error() {
    let mut coordinator = NegotiationCoordinator::new(
        OfflineOracle::shared(),
        roster(),
        NegotiationConfig::default(),
    );
    let err = coordinator
        .negotiate("proposal-99", &ids(&["security"]), &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::ProposalNotFound(id) if id == "proposal-99"));
}
