//! Tasks, their lifecycle, and redistribution records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// Task identifier, `task-<n>`.
pub type TaskId = String;

/// Task priority. Orders `Background < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Background,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Parse a priority name. Unknown values coerce to `Medium`.
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" | "urgent" => Self::Critical,
            "high" => Self::High,
            "low" => Self::Low,
            "background" | "idle" => Self::Background,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for capacity or dependencies.
    Pending,
    /// Holding a slot on an agent.
    Assigned,
    /// The agent has started work.
    InProgress,
    Completed,
    Failed,
    /// Moving between agents; always followed by `Assigned`.
    Redistributed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the rebalancer may move a task in this status.
    pub fn is_redistributable(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Assigned, Self::Redistributed],
            Self::Assigned => &[Self::InProgress, Self::Redistributed],
            Self::Redistributed => &[Self::Assigned],
            Self::InProgress => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Redistributed => write!(f, "redistributed"),
        }
    }
}

/// A status transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid task transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for {task_id}: {from} → {to}")]
pub struct TaskTransitionError {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Free-form type tag
    pub task_type: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_to: Option<AgentId>,
    pub required_expertise: BTreeSet<String>,
    /// Tasks that must be completed before this one may be assigned
    pub dependencies: Vec<TaskId>,
    /// Recorded only; resubmission is the caller's job
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub context: serde_json::Value,
    pub history: Vec<TaskTransition>,
}

impl Task {
    pub fn new(id: &str, task_type: &str, description: &str, priority: TaskPriority) -> Self {
        Self {
            id: id.to_string(),
            task_type: task_type.to_string(),
            description: description.to_string(),
            priority,
            status: TaskStatus::Pending,
            assigned_to: None,
            required_expertise: BTreeSet::new(),
            dependencies: Vec::new(),
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            context: serde_json::Value::Null,
            history: Vec::new(),
        }
    }

    /// Record required expertise terms, lowercased.
    pub fn with_expertise<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_expertise = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Move to a new status, stamping the matching timestamp.
    pub fn transition(&mut self, to: TaskStatus, reason: &str) -> Result<(), TaskTransitionError> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(TaskTransitionError {
                task_id: self.id.clone(),
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        self.history.push(TaskTransition {
            from: self.status,
            to,
            timestamp: now,
            reason: reason.to_string(),
        });
        self.status = to;

        match to {
            TaskStatus::Assigned => self.assigned_at = Some(now),
            TaskStatus::InProgress => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(now),
            TaskStatus::Pending | TaskStatus::Redistributed => {}
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} ({}) -> {}",
            self.status,
            self.id,
            self.priority,
            self.assigned_to.as_deref().unwrap_or("-")
        )
    }
}

/// How pressing a redistribution is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A task move made by the rebalancer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedistributionDecision {
    pub task_id: TaskId,
    pub from: AgentId,
    pub to: AgentId,
    pub reason: String,
    pub urgency: Urgency,
    pub decided_at: DateTime<Utc>,
}
