//! Capacity scheduler: assignment, completion and rebalancing.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::capacity::AgentCapacity;
use super::task::{
    RedistributionDecision, Task, TaskId, TaskPriority, TaskStatus, TaskTransitionError, Urgency,
};
use crate::agents::{AgentId, SharedRoster};
use crate::events::{CoordinationEvent, SharedEventBus};
use crate::oracle::{QueryKind, SharedOracle, StructuredQuery};
use crate::store::Registry;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Slots for agents that do not set their own limit
    pub default_max_concurrent_tasks: usize,
    /// Recorded on each task; never acted upon here
    pub default_max_retries: u32,
    /// Utilization above which an agent sheds work
    pub overload_threshold: f64,
    /// Utilization below which an available agent takes work
    pub underload_threshold: f64,
    /// Weight kept by the previous average duration
    pub duration_smoothing: f64,
    /// Re-run assignment for pending tasks after every completion
    pub dispatch_on_completion: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent_tasks: 3,
            default_max_retries: 3,
            overload_threshold: 0.8,
            underload_threshold: 0.3,
            duration_smoothing: 0.7,
            dispatch_on_completion: false,
        }
    }
}

/// Errors from scheduler lookups and transitions.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error(transparent)]
    Transition(#[from] TaskTransitionError),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// What happened when a task finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    /// The task after completion
    pub task: Task,
    pub agent_id: Option<AgentId>,
    /// Moves made by the rebalancing pass that followed
    pub redistributions: Vec<RedistributionDecision>,
    /// Pending tasks assigned afterwards, when dispatch on completion is on
    pub dispatched: Vec<TaskId>,
}

/// Per-agent entry of [`SchedulerStatistics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub current_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub utilization: f64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub average_duration_secs: f64,
    pub performance_score: f64,
    pub is_available: bool,
}

impl From<&AgentCapacity> for AgentSummary {
    fn from(capacity: &AgentCapacity) -> Self {
        Self {
            agent_id: capacity.agent_id.clone(),
            current_tasks: capacity.current_tasks.len(),
            max_concurrent_tasks: capacity.max_concurrent_tasks,
            utilization: capacity.utilization(),
            completed_tasks: capacity.completed_tasks,
            failed_tasks: capacity.failed_tasks,
            average_duration_secs: capacity.average_duration_secs,
            performance_score: capacity.performance_score,
            is_available: capacity.is_available,
        }
    }
}

/// Read-only snapshot of scheduler state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    pub total_tasks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub redistributions: usize,
    pub average_utilization: f64,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct RankAnswer {
    agent_id: String,
}

const RANK_SHAPE: &str = r#"{"agent_id": string}"#;

/// Assigns tasks to agents within their concurrency limits.
pub struct CapacityScheduler {
    oracle: SharedOracle,
    roster: SharedRoster,
    config: SchedulerConfig,
    tasks: Registry<Task>,
    capacities: BTreeMap<AgentId, AgentCapacity>,
    redistributions: Vec<RedistributionDecision>,
    event_bus: Option<SharedEventBus>,
}

impl CapacityScheduler {
    pub fn new(oracle: SharedOracle, roster: SharedRoster, config: SchedulerConfig) -> Self {
        Self::with_registry(oracle, roster, config, Registry::new("task"))
    }

    /// Create a scheduler over a pre-populated task registry.
    ///
    /// Assigned and in-progress tasks in the registry take their agent's
    /// slots before anything new is placed.
    pub fn with_registry(
        oracle: SharedOracle,
        roster: SharedRoster,
        config: SchedulerConfig,
        tasks: Registry<Task>,
    ) -> Self {
        let mut capacities: BTreeMap<AgentId, AgentCapacity> = roster
            .agents()
            .iter()
            .map(|agent| {
                let slots = agent
                    .max_concurrent_tasks
                    .unwrap_or(config.default_max_concurrent_tasks);
                (agent.id.clone(), AgentCapacity::new(&agent.id, slots))
            })
            .collect();

        let active = tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress));
        for task in active {
            let held = task
                .assigned_to
                .as_deref()
                .and_then(|agent| capacities.get_mut(agent))
                .is_some_and(|capacity| capacity.hold(&task.id));
            if !held {
                warn!(
                    task_id = %task.id,
                    agent_id = ?task.assigned_to,
                    "Active task could not take a slot on its agent"
                );
            }
        }

        Self {
            oracle,
            roster,
            config,
            tasks,
            capacities,
            redistributions: Vec::new(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a task and try to assign it straight away.
    ///
    /// The task stays pending when a dependency is missing or incomplete, or
    /// when no agent has a free slot. Nothing re-checks it later unless
    /// `dispatch_pending` runs.
    pub async fn submit(
        &mut self,
        task_type: &str,
        description: &str,
        priority: TaskPriority,
        required_expertise: &[String],
        dependencies: &[TaskId],
        context: serde_json::Value,
    ) -> Task {
        let id = self.tasks.next_id();
        let task = Task::new(&id, task_type, description, priority)
            .with_expertise(required_expertise)
            .with_dependencies(dependencies.to_vec())
            .with_context(context)
            .with_max_retries(self.config.default_max_retries);
        self.tasks.put(&id, task.clone());

        info!(
            task_id = %id,
            task_type,
            priority = %priority,
            dependencies = dependencies.len(),
            "Task submitted"
        );
        self.publish(CoordinationEvent::TaskSubmitted {
            task_id: id.clone(),
            priority,
            dependencies: dependencies.len(),
            timestamp: task.created_at,
        });

        self.assign(&id).await;
        self.tasks.get(&id).cloned().unwrap_or(task)
    }

    /// Try to place a pending task on an agent.
    ///
    /// Returns false when the task is unknown or not pending, a dependency
    /// is not completed, or no agent can accept it.
    pub async fn assign(&mut self, task_id: &str) -> bool {
        let Some(task) = self.tasks.get(task_id).cloned() else {
            warn!(task_id, "Assignment requested for unknown task");
            return false;
        };
        if task.status != TaskStatus::Pending {
            debug!(task_id, status = %task.status, "Task is not pending, skipping assignment");
            return false;
        }
        if let Some(blocker) = self.blocking_dependency(&task) {
            debug!(task_id, dependency = %blocker, "Assignment deferred on dependency");
            return false;
        }

        let candidates: Vec<AgentId> = self
            .capacities
            .values()
            .filter(|c| c.can_accept())
            .map(|c| c.agent_id.clone())
            .collect();

        let Some((agent_id, ranked_by_oracle)) = self.select_agent(&task, &candidates).await else {
            info!(task_id, "No agent has capacity, task stays pending");
            return false;
        };
        self.place(task_id, &agent_id, ranked_by_oracle)
    }

    /// Mark an assigned task as started.
    pub fn start(&mut self, task_id: &str) -> SchedulerResult<()> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        task.transition(TaskStatus::InProgress, "work started")?;
        debug!(task_id, agent_id = ?task.assigned_to, "Task started");
        Ok(())
    }

    /// Record a task's outcome, free its slot, then run one rebalancing pass.
    ///
    /// Unknown ids and tasks that never reached an agent are logged and
    /// ignored.
    pub async fn complete(
        &mut self,
        task_id: &str,
        success: bool,
        duration_secs: f64,
    ) -> Option<CompletionReport> {
        let Some(task) = self.tasks.get_mut(task_id) else {
            warn!(task_id, "Completion for unknown task ignored");
            return None;
        };

        if task.status == TaskStatus::Assigned {
            if let Err(e) = task.transition(TaskStatus::InProgress, "completed without start") {
                warn!(task_id, error = %e, "Completion ignored");
                return None;
            }
        }
        let (to, reason) = if success {
            (TaskStatus::Completed, "completed")
        } else {
            (TaskStatus::Failed, "failed")
        };
        if let Err(e) = task.transition(to, reason) {
            warn!(task_id, error = %e, "Completion ignored");
            return None;
        }
        let snapshot = task.clone();
        let agent_id = snapshot.assigned_to.clone();

        if let Some(capacity) = agent_id.as_deref().and_then(|a| self.capacities.get_mut(a)) {
            capacity.release(task_id);
            capacity.record_outcome(success, duration_secs, self.config.duration_smoothing);
        }

        info!(
            task_id,
            agent_id = ?agent_id,
            success,
            duration_secs,
            "Task finished"
        );
        self.publish(CoordinationEvent::TaskCompleted {
            task_id: task_id.to_string(),
            agent_id: agent_id.clone(),
            success,
            duration_secs,
            timestamp: Utc::now(),
        });

        let redistributions = self.check_rebalancing().await;
        let dispatched = if self.config.dispatch_on_completion {
            self.dispatch_pending().await
        } else {
            Vec::new()
        };

        Some(CompletionReport {
            task: snapshot,
            agent_id,
            redistributions,
            dispatched,
        })
    }

    /// One pass moving work from overloaded to underloaded agents.
    ///
    /// Each overloaded agent gives up at most its lowest-priority task that
    /// has not started. The pass does not loop to a fixed point.
    pub async fn check_rebalancing(&mut self) -> Vec<RedistributionDecision> {
        let overloaded: Vec<AgentId> = self
            .capacities
            .values()
            .filter(|c| c.utilization() > self.config.overload_threshold)
            .map(|c| c.agent_id.clone())
            .collect();

        let mut decisions = Vec::new();
        for source in overloaded {
            let Some(task) = self.lowest_priority_movable(&source) else {
                continue;
            };

            let underloaded: Vec<AgentId> = self
                .capacities
                .values()
                .filter(|c| {
                    c.agent_id != source
                        && c.can_accept()
                        && c.utilization() < self.config.underload_threshold
                })
                .map(|c| c.agent_id.clone())
                .collect();
            if underloaded.is_empty() {
                debug!(agent_id = %source, "Overloaded but no underloaded agent to take work");
                continue;
            }

            let Some((target, _)) = self.select_agent(&task, &underloaded).await else {
                continue;
            };
            if let Some(decision) = self.move_task(&task.id, &source, &target) {
                decisions.push(decision);
            }
        }
        decisions
    }

    /// Toggle whether an agent accepts new work.
    pub fn set_availability(&mut self, agent_id: &str, available: bool) -> SchedulerResult<()> {
        let capacity = self
            .capacities
            .get_mut(agent_id)
            .ok_or_else(|| SchedulerError::AgentNotFound(agent_id.to_string()))?;
        capacity.is_available = available;
        info!(agent_id, available, "Agent availability changed");
        Ok(())
    }

    /// Re-attempt assignment of every pending task, highest priority first,
    /// then in submission order.
    ///
    /// Returns the ids that were assigned.
    pub async fn dispatch_pending(&mut self) -> Vec<TaskId> {
        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        // Stable sort: equal timestamps keep registry order
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        let pending: Vec<TaskId> = pending.into_iter().map(|t| t.id.clone()).collect();

        let mut assigned = Vec::new();
        for task_id in pending {
            if self.assign(&task_id).await {
                assigned.push(task_id);
            }
        }
        if !assigned.is_empty() {
            info!(count = assigned.len(), "Pending tasks dispatched");
        }
        assigned
    }

    pub fn task(&self, task_id: &str) -> SchedulerResult<&Task> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn capacity(&self, agent_id: &str) -> SchedulerResult<&AgentCapacity> {
        self.capacities
            .get(agent_id)
            .ok_or_else(|| SchedulerError::AgentNotFound(agent_id.to_string()))
    }

    pub fn capacities(&self) -> impl Iterator<Item = &AgentCapacity> {
        self.capacities.values()
    }

    pub fn redistributions(&self) -> &[RedistributionDecision] {
        &self.redistributions
    }

    pub fn statistics(&self) -> SchedulerStatistics {
        let mut by_status = BTreeMap::new();
        for task in self.tasks.values() {
            *by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }

        let agents: Vec<AgentSummary> = self.capacities.values().map(AgentSummary::from).collect();
        let average_utilization = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.utilization).sum::<f64>() / agents.len() as f64
        };

        SchedulerStatistics {
            total_tasks: self.tasks.len(),
            by_status,
            redistributions: self.redistributions.len(),
            average_utilization,
            agents,
        }
    }

    /// First dependency that is missing or not completed.
    fn blocking_dependency<'a>(&self, task: &'a Task) -> Option<&'a TaskId> {
        task.dependencies.iter().find(|dep| {
            self.tasks
                .get(dep)
                .map(|d| d.status != TaskStatus::Completed)
                .unwrap_or(true)
        })
    }

    /// Pick an agent among `candidates`. The flag is true when the oracle
    /// made the choice.
    async fn select_agent(&self, task: &Task, candidates: &[AgentId]) -> Option<(AgentId, bool)> {
        match candidates {
            [] => None,
            [only] => Some((only.clone(), false)),
            _ => {
                let profiles: Vec<serde_json::Value> = candidates
                    .iter()
                    .filter_map(|id| self.candidate_profile(id, task))
                    .collect();
                let query: StructuredQuery<Option<RankAnswer>> = StructuredQuery::new(
                    QueryKind::RankAgents,
                    format!(
                        "You are the scheduler choosing an agent for a {}-priority task.",
                        task.priority
                    ),
                    serde_json::json!({
                        "task": {
                            "id": task.id,
                            "type": task.task_type,
                            "description": task.description,
                            "priority": task.priority,
                            "required_expertise": task.required_expertise,
                        },
                        "candidates": profiles,
                    }),
                    RANK_SHAPE,
                    None,
                );

                let (answer, _) = query.ask(self.oracle.as_ref()).await;
                match answer {
                    Some(pick) if candidates.contains(&pick.agent_id) => Some((pick.agent_id, true)),
                    Some(pick) => {
                        warn!(
                            task_id = %task.id,
                            agent_id = %pick.agent_id,
                            "Ranked agent is not a candidate, using fallback scoring"
                        );
                        self.fallback_pick(task, candidates).map(|id| (id, false))
                    }
                    None => self.fallback_pick(task, candidates).map(|id| (id, false)),
                }
            }
        }
    }

    /// Deterministic choice: most expertise overlap, then lowest utilization,
    /// then highest performance, then agent id.
    fn fallback_pick(&self, task: &Task, candidates: &[AgentId]) -> Option<AgentId> {
        let mut scored: Vec<(&AgentId, usize, f64, f64)> = candidates
            .iter()
            .filter_map(|id| {
                let capacity = self.capacities.get(id)?;
                Some((
                    id,
                    self.expertise_overlap(id, task),
                    capacity.utilization(),
                    capacity.performance_score,
                ))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(a.2.total_cmp(&b.2))
                .then(b.3.total_cmp(&a.3))
                .then(a.0.cmp(b.0))
        });
        scored.first().map(|(id, ..)| (*id).clone())
    }

    fn expertise_overlap(&self, agent_id: &str, task: &Task) -> usize {
        self.roster
            .get(agent_id)
            .map(|a| a.expertise_overlap(&task.required_expertise))
            .unwrap_or(0)
    }

    fn candidate_profile(&self, agent_id: &str, task: &Task) -> Option<serde_json::Value> {
        let capacity = self.capacities.get(agent_id)?;
        let agent = self.roster.get(agent_id);
        Some(serde_json::json!({
            "agent_id": agent_id,
            "role": agent.map(|a| a.role_label()).unwrap_or(agent_id),
            "expertise": agent.map(|a| &a.expertise),
            "expertise_overlap": self.expertise_overlap(agent_id, task),
            "current_load": capacity.current_tasks.len(),
            "utilization": capacity.utilization(),
            "performance_score": capacity.performance_score,
            "completed_tasks": capacity.completed_tasks,
            "failed_tasks": capacity.failed_tasks,
        }))
    }

    fn place(&mut self, task_id: &str, agent_id: &str, ranked_by_oracle: bool) -> bool {
        let (Some(task), Some(capacity)) = (
            self.tasks.get_mut(task_id),
            self.capacities.get_mut(agent_id),
        ) else {
            return false;
        };
        if !capacity.hold(task_id) {
            return false;
        }
        if let Err(e) = task.transition(TaskStatus::Assigned, &format!("assigned to {}", agent_id)) {
            capacity.release(task_id);
            warn!(task_id, error = %e, "Assignment rejected");
            return false;
        }
        task.assigned_to = Some(agent_id.to_string());

        info!(
            task_id,
            agent_id,
            ranked_by_oracle,
            load = capacity.current_tasks.len(),
            max = capacity.max_concurrent_tasks,
            "Task assigned"
        );
        self.publish(CoordinationEvent::TaskAssigned {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            ranked_by_oracle,
            timestamp: Utc::now(),
        });
        true
    }

    /// Lowest-priority task held by `agent_id` that has not started.
    fn lowest_priority_movable(&self, agent_id: &str) -> Option<Task> {
        let capacity = self.capacities.get(agent_id)?;
        capacity
            .current_tasks
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.status.is_redistributable())
            .min_by_key(|t| t.priority)
            .cloned()
    }

    fn move_task(&mut self, task_id: &str, from: &str, to: &str) -> Option<RedistributionDecision> {
        let urgency = match self.capacities.get(from) {
            Some(source) if source.available_capacity() == 0 => Urgency::High,
            _ => Urgency::Medium,
        };
        let reason = format!("{} overloaded, {} underloaded", from, to);

        let task = self.tasks.get_mut(task_id)?;
        let target = self.capacities.get_mut(to)?;
        if !target.hold(task_id) {
            return None;
        }
        let moved = task
            .transition(TaskStatus::Redistributed, &reason)
            .and_then(|()| task.transition(TaskStatus::Assigned, &format!("assigned to {}", to)));
        if let Err(e) = moved {
            target.release(task_id);
            warn!(task_id, error = %e, "Redistribution rejected");
            return None;
        }
        task.assigned_to = Some(to.to_string());
        if let Some(source) = self.capacities.get_mut(from) {
            source.release(task_id);
        }

        let decision = RedistributionDecision {
            task_id: task_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reason,
            urgency,
            decided_at: Utc::now(),
        };
        info!(
            task_id,
            from,
            to,
            urgency = %urgency,
            "Task redistributed"
        );
        self.publish(CoordinationEvent::TaskRedistributed {
            task_id: task_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            urgency,
            timestamp: decision.decided_at,
        });
        self.redistributions.push(decision.clone());
        Some(decision)
    }

    fn publish(&self, event: CoordinationEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}
