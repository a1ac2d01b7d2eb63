//! Property tests: seeded random operation sequences checked against the
//! invariants that must hold for every input.
//!
//! Tests verify:
//! - No agent ever holds more tasks than its concurrency limit
//! - Every active task is held by exactly one agent, also after rebalancing
//! - No task leaves pending before all its dependencies completed
//! - A single veto rejects under every veto-honoring strategy
//! - Negotiations always conclude within their round budget

mod common;

use std::collections::BTreeMap;
use std::sync::Mutex;

use agent_coordination::consensus::majority_decision;
use agent_coordination::{
    Agent, AgentRoster, CapacityScheduler, ConsensusConfig, ConsensusEngine, ConsensusStrategy,
    NegotiationConfig, NegotiationCoordinator, Proposal, ProposalType, QueryKind,
    SchedulerConfig, TaskId, TaskPriority, TaskStatus, Vote, VoteType,
};
use common::{ids, is_kind, roster, shared, stance, ScriptedOracle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEEDS: u64 = 40;

const PRIORITIES: [TaskPriority; 4] = [
    TaskPriority::Low,
    TaskPriority::Medium,
    TaskPriority::High,
    TaskPriority::Critical,
];

/// Scheduler over three agents with seed-dependent limits, ranked by an
/// oracle that sometimes names an agent outside the candidate set.
fn sweep_scheduler(seed: u64) -> CapacityScheduler {
    let agents = ["alpha", "beta", "gamma"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            Agent::new(id, "Generalist")
                .with_expertise("review", 0.5)
                .with_capacity(1 + (seed as usize + i) % 3)
        })
        .collect();

    let picks = Mutex::new(StdRng::seed_from_u64(seed ^ 0x5eed));
    let oracle = ScriptedOracle::new(move |req| {
        if !is_kind(req, QueryKind::RankAgents) {
            return None;
        }
        let names = ["alpha", "beta", "gamma", "nobody"];
        let pick = picks.lock().ok()?.gen_range(0..names.len());
        Some(serde_json::json!({ "agent_id": names[pick] }))
    });

    CapacityScheduler::new(
        shared(&oracle),
        AgentRoster::new(agents).shared(),
        SchedulerConfig::default(),
    )
}

fn with_status(scheduler: &CapacityScheduler, statuses: &[TaskStatus]) -> Vec<TaskId> {
    scheduler
        .tasks()
        .filter(|t| statuses.contains(&t.status))
        .map(|t| t.id.clone())
        .collect()
}

fn assert_scheduler_invariants(scheduler: &CapacityScheduler, seed: u64, step: usize) {
    let mut holders: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for capacity in scheduler.capacities() {
        assert!(
            capacity.current_tasks.len() <= capacity.max_concurrent_tasks,
            "seed={} step={}: {} holds {} of {} slots",
            seed,
            step,
            capacity.agent_id,
            capacity.current_tasks.len(),
            capacity.max_concurrent_tasks
        );
        for task_id in &capacity.current_tasks {
            holders
                .entry(task_id.as_str())
                .or_default()
                .push(capacity.agent_id.as_str());
        }
    }

    for task in scheduler.tasks() {
        let held_by = holders.get(task.id.as_str()).cloned().unwrap_or_default();
        match task.status {
            TaskStatus::Assigned | TaskStatus::InProgress => {
                assert_eq!(
                    held_by,
                    vec![task.assigned_to.as_deref().unwrap_or("")],
                    "seed={} step={}: {} must be held by its assignee only",
                    seed,
                    step,
                    task.id
                );
            }
            _ => assert!(
                held_by.is_empty(),
                "seed={} step={}: {} is {} but held by {:?}",
                seed,
                step,
                task.id,
                task.status,
                held_by
            ),
        }

        if task.status != TaskStatus::Pending {
            for dep in &task.dependencies {
                let dep_status = scheduler.task(dep).map(|d| d.status).ok();
                assert_eq!(
                    dep_status,
                    Some(TaskStatus::Completed),
                    "seed={} step={}: {} left pending before dependency {}",
                    seed,
                    step,
                    task.id,
                    dep
                );
            }
        }
    }
}

// ── Property: capacity, uniqueness and dependencies hold at every step ──

#[tokio::test]
async fn prop_scheduler_invariants_hold_across_random_operations() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scheduler = sweep_scheduler(seed);
        let mut submitted: Vec<TaskId> = Vec::new();

        for step in 0..60 {
            match rng.gen_range(0..6) {
                0 | 1 => {
                    let mut deps = Vec::new();
                    if !submitted.is_empty() && rng.gen_bool(0.3) {
                        deps.push(submitted[rng.gen_range(0..submitted.len())].clone());
                    }
                    if rng.gen_bool(0.05) {
                        deps.push("task-missing".to_string());
                    }
                    let priority = PRIORITIES[rng.gen_range(0..PRIORITIES.len())];
                    let task = scheduler
                        .submit(
                            "review",
                            &format!("Step {}", step),
                            priority,
                            &ids(&["review"]),
                            &deps,
                            serde_json::Value::Null,
                        )
                        .await;
                    submitted.push(task.id);
                }
                2 => {
                    let assigned = with_status(&scheduler, &[TaskStatus::Assigned]);
                    if !assigned.is_empty() {
                        let id = &assigned[rng.gen_range(0..assigned.len())];
                        scheduler.start(id).unwrap();
                    }
                }
                3 => {
                    let active =
                        with_status(&scheduler, &[TaskStatus::Assigned, TaskStatus::InProgress]);
                    if !active.is_empty() {
                        let id = active[rng.gen_range(0..active.len())].clone();
                        let success = rng.gen_bool(0.8);
                        assert!(scheduler.complete(&id, success, 5.0).await.is_some());
                    }
                }
                4 => {
                    let agent = ["alpha", "beta", "gamma"][rng.gen_range(0..3)];
                    scheduler.set_availability(agent, rng.gen_bool(0.6)).unwrap();
                    scheduler.check_rebalancing().await;
                }
                _ => {
                    scheduler.dispatch_pending().await;
                }
            }
            assert_scheduler_invariants(&scheduler, seed, step);
        }

        assert_eq!(
            scheduler.statistics().total_tasks,
            submitted.len(),
            "seed={}: every submission gets its own task",
            seed
        );
    }
}

// ── Property: a veto rejects every vote set ─────────────────────────

fn random_ballot(rng: &mut StdRng, voters: &[String]) -> Vec<Vote> {
    let others = [VoteType::Approve, VoteType::Reject, VoteType::Abstain];
    let veto_at = rng.gen_range(0..voters.len());
    voters
        .iter()
        .enumerate()
        .map(|(i, voter)| {
            let vote = if i == veto_at {
                VoteType::Veto
            } else {
                others[rng.gen_range(0..others.len())]
            };
            Vote::new(voter, vote, rng.gen_range(0.0..=1.0))
        })
        .collect()
}

#[tokio::test]
async fn prop_veto_rejects_any_vote_set() {
    let engine = ConsensusEngine::new(
        shared(&ScriptedOracle::new(|_| None)),
        roster(),
        ConsensusConfig::default(),
    );
    let proposal = Proposal::new(
        "proposal-1",
        "architect",
        ProposalType::Policy,
        "Tighten credential handling",
        "Require hardware keys for deploys",
    );
    let pool = ids(&["architect", "security", "performance", "qa", "ops"]);

    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = rng.gen_range(1..=pool.len());
        let ballot = random_ballot(&mut rng, &pool[..size]);

        for strategy in [ConsensusStrategy::SimpleMajority, ConsensusStrategy::SuperMajority] {
            let decision = majority_decision(ballot.clone(), strategy, 0.5);
            assert_eq!(decision.decision, VoteType::Reject, "seed={} {}", seed, strategy);
            assert!(!decision.consensus_reached, "seed={} {}", seed, strategy);
        }

        let weighted = engine
            .reach_consensus(
                &proposal,
                ballot,
                ConsensusStrategy::Weighted,
                &serde_json::json!({}),
            )
            .await;
        assert_eq!(weighted.decision, VoteType::Reject, "seed={} weighted", seed);
        assert_eq!(weighted.approval_ratio, 0.0, "seed={} weighted", seed);
    }
}

// ── Property: negotiations end within their round budget ────────────

#[tokio::test]
async fn prop_negotiation_ends_within_max_rounds() {
    let participants = ids(&["security", "performance", "qa", "ops"]);

    for seed in 0..SEEDS {
        let max_rounds = 1 + (seed % 5) as u32;
        let stances = Mutex::new(StdRng::seed_from_u64(seed));
        let oracle = ScriptedOracle::new(move |req| {
            if !is_kind(req, QueryKind::EvaluateStance) {
                return None;
            }
            let choice = ["support", "oppose", "counter_propose", "???"];
            let pick = stances.lock().ok()?.gen_range(0..choice.len());
            Some(stance(choice[pick], "Seeded opinion"))
        });
        let config = NegotiationConfig {
            max_rounds,
            ..Default::default()
        };
        let mut coordinator = NegotiationCoordinator::new(shared(&oracle), roster(), config);
        let proposal = coordinator
            .propose(
                "architect",
                ProposalType::Architecture,
                "Queue writes to the ledger",
                "Put a durable queue in front of ledger writes",
                &serde_json::json!({}),
                &[],
            )
            .await;

        let result = coordinator
            .negotiate(&proposal.id, &participants, &serde_json::json!({}))
            .await
            .unwrap();

        assert!(
            (1..=max_rounds).contains(&result.rounds_completed()),
            "seed={}: {} rounds with a budget of {}",
            seed,
            result.rounds_completed(),
            max_rounds
        );
        let record = coordinator.negotiation(&result.negotiation_id).unwrap();
        assert!(record.is_complete(), "seed={}: status {:?}", seed, result.status);
    }
}
