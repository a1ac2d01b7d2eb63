//! Coordination CLI
//!
//! Runs a scenario end to end: draft a proposal, negotiate it, vote on the
//! outcome, then schedule and complete the scenario's tasks.
//!
//! # Usage
//!
//! ```bash
//! # Against a local OpenAI-compatible endpoint
//! coordination simulate --scenario scenarios/demo.toml
//!
//! # Offline: every oracle call takes its fallback
//! coordination simulate --scenario scenarios/demo.toml --offline
//!
//! # Custom configuration
//! COORD_MAX_ROUNDS=3 coordination simulate --scenario scenarios/demo.toml --config coordination.toml
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_coordination::{
    Agent, AgentId, AgentRoster, CapacityScheduler, ConsensusEngine, ConsensusStrategy,
    CoordinationConfig, EventBus, HttpOracle, NegotiationCoordinator, OfflineOracle,
    ProposalType, SharedOracle, TaskId, TaskPriority, TaskStatus,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario file and print the resulting statistics as JSON
    Simulate {
        /// Scenario TOML (agents, proposal, tasks)
        #[arg(long)]
        scenario: PathBuf,

        /// Coordination config TOML (COORD_* variables still apply)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Never contact the oracle
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// A scenario file.
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Negotiation participants; all agents when omitted
    #[serde(default)]
    participants: Option<Vec<AgentId>>,
    /// Strategy for the follow-up vote; the configured default when omitted
    #[serde(default)]
    strategy: Option<String>,
    agents: Vec<Agent>,
    proposal: ScenarioProposal,
    #[serde(default)]
    tasks: Vec<ScenarioTask>,
}

#[derive(Debug, Deserialize)]
struct ScenarioProposal {
    proposer: AgentId,
    #[serde(rename = "type", default)]
    proposal_type: String,
    title: String,
    description: String,
    #[serde(default)]
    required_approvers: Vec<AgentId>,
    #[serde(default)]
    context: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ScenarioTask {
    /// Scenario-local name other tasks depend on
    key: String,
    #[serde(rename = "type", default)]
    task_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    expertise: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default = "default_duration")]
    duration_secs: f64,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_duration() -> f64 {
    60.0
}

fn default_success() -> bool {
    true
}

fn load_config(path: Option<&Path>) -> Result<CoordinationConfig> {
    match path {
        Some(path) => CoordinationConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let config = CoordinationConfig::from_env();
            config.validate().context("Invalid configuration from environment")?;
            Ok(config)
        }
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario TOML")
}

fn build_oracle(config: &CoordinationConfig) -> Result<SharedOracle> {
    if config.oracle.offline {
        info!("Oracle offline, every judgment takes its fallback");
        return Ok(OfflineOracle::shared());
    }
    let oracle = HttpOracle::new(config.oracle.clone()).context("Failed to build HTTP oracle")?;
    info!(endpoint = %config.oracle.endpoint, model = %config.oracle.model, "Oracle configured");
    Ok(Arc::new(oracle))
}

async fn simulate(scenario: Scenario, config: CoordinationConfig) -> Result<serde_json::Value> {
    let oracle = build_oracle(&config)?;
    let roster = AgentRoster::new(scenario.agents).shared();
    anyhow::ensure!(!roster.is_empty(), "Scenario defines no agents");

    let bus = EventBus::with_history(1024).shared();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(event_type = event.event_type(), "Event");
        }
    });

    let mut negotiator =
        NegotiationCoordinator::new(oracle.clone(), roster.clone(), config.negotiation.clone())
            .with_event_bus(bus.clone());
    let engine = ConsensusEngine::new(oracle.clone(), roster.clone(), config.consensus.clone())
        .with_event_bus(bus.clone());
    let mut scheduler =
        CapacityScheduler::new(oracle.clone(), roster.clone(), config.scheduler.clone())
            .with_event_bus(bus.clone());

    // Negotiate
    let request = scenario.proposal;
    let context = serde_json::to_value(&request.context)?;
    let proposal = negotiator
        .propose(
            &request.proposer,
            ProposalType::from_str_lenient(&request.proposal_type),
            &request.title,
            &request.description,
            &context,
            &request.required_approvers,
        )
        .await;

    let participants = scenario.participants.unwrap_or_else(|| roster.ids());
    let negotiation = negotiator
        .negotiate(&proposal.id, &participants, &context)
        .await
        .context("Negotiation failed")?;
    info!(summary = %negotiation.summary_line(), "Negotiation finished");

    // Vote on whatever the negotiation settled on
    let subject = negotiation
        .final_proposal
        .clone()
        .unwrap_or_else(|| proposal.clone());
    let strategy = scenario
        .strategy
        .as_deref()
        .map(ConsensusStrategy::from_str_lenient)
        .unwrap_or(engine.config().default_strategy);
    let votes = engine.collect_votes(&subject, &participants, &context).await;
    let decision = engine
        .reach_consensus(&subject, votes, strategy, &context)
        .await;
    info!(summary = %decision.summary_line(), "Vote finished");

    // Schedule and work through the tasks when the proposal went through
    if negotiation.consensus_reached() || decision.is_approved() {
        let mut ids: HashMap<String, TaskId> = HashMap::new();
        let mut outcomes: HashMap<TaskId, (bool, f64)> = HashMap::new();
        for task in &scenario.tasks {
            let dependencies: Vec<TaskId> = task
                .depends_on
                .iter()
                .map(|key| {
                    ids.get(key).cloned().unwrap_or_else(|| {
                        warn!(task = %task.key, dependency = %key, "Unknown dependency key, task will stay pending");
                        key.clone()
                    })
                })
                .collect();
            let submitted = scheduler
                .submit(
                    if task.task_type.is_empty() { "task" } else { &task.task_type },
                    &task.description,
                    TaskPriority::from_str_lenient(&task.priority),
                    &task.expertise,
                    &dependencies,
                    serde_json::json!({ "key": task.key }),
                )
                .await;
            outcomes.insert(submitted.id.clone(), (task.success, task.duration_secs));
            ids.insert(task.key.clone(), submitted.id);
        }
        run_tasks(&mut scheduler, &outcomes).await;
    } else {
        info!("Proposal not accepted, no tasks scheduled");
    }

    Ok(serde_json::json!({
        "negotiation": {
            "id": negotiation.negotiation_id,
            "status": negotiation.status,
            "rounds": negotiation.rounds_completed(),
            "final_proposal": negotiation.final_proposal.as_ref().map(|p| &p.id),
            "rationale": negotiation.rationale,
            "decision": negotiation.decision.summary_line(),
        },
        "vote": {
            "strategy": decision.strategy,
            "decision": decision.decision,
            "approval_ratio": decision.approval_ratio,
            "consensus_reached": decision.consensus_reached,
            "rationale": decision.rationale,
        },
        "negotiation_statistics": negotiator.statistics(),
        "scheduler_statistics": scheduler.statistics(),
        "redistributions": scheduler.redistributions(),
        "events": bus.stats(),
    }))
}

/// Complete assigned tasks until nothing more can move.
async fn run_tasks(scheduler: &mut CapacityScheduler, outcomes: &HashMap<TaskId, (bool, f64)>) {
    loop {
        let assigned: Vec<TaskId> = scheduler
            .tasks()
            .filter(|t| t.status == TaskStatus::Assigned)
            .map(|t| t.id.clone())
            .collect();

        if assigned.is_empty() {
            if scheduler.dispatch_pending().await.is_empty() {
                break;
            }
            continue;
        }

        let mut progressed = false;
        for task_id in assigned {
            if let Err(e) = scheduler.start(&task_id) {
                warn!(task_id = %task_id, error = %e, "Could not start task");
                continue;
            }
            let (success, duration) = outcomes.get(&task_id).copied().unwrap_or((true, 60.0));
            progressed |= scheduler.complete(&task_id, success, duration).await.is_some();
        }
        if !progressed {
            break;
        }
    }

    let stuck = scheduler
        .tasks()
        .filter(|t| t.status == TaskStatus::Pending)
        .count();
    if stuck > 0 {
        warn!(count = stuck, "Tasks left pending (failed or missing dependencies)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Simulate {
            scenario,
            config,
            offline,
        } => {
            let mut config = load_config(config.as_deref())?;
            if offline {
                config.oracle.offline = true;
            }
            let scenario = load_scenario(&scenario)?;
            info!(
                agents = scenario.agents.len(),
                tasks = scenario.tasks.len(),
                offline = config.oracle.offline,
                "Starting simulation"
            );
            let report = simulate(scenario, config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
