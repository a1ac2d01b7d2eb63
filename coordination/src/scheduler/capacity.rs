//! Per-agent capacity tracking.

use serde::{Deserialize, Serialize};

use super::task::TaskId;
use crate::agents::AgentId;

/// Score an agent starts with and returns to when it has no history.
pub const NOMINAL_PERFORMANCE: f64 = 1.0;

/// Live load and track record of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapacity {
    pub agent_id: AgentId,
    pub max_concurrent_tasks: usize,
    /// Tasks currently holding a slot, in assignment order
    pub current_tasks: Vec<TaskId>,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Exponentially smoothed task duration
    pub average_duration_secs: f64,
    pub duration_samples: u64,
    /// Success rate × 2, in [0, 2]
    pub performance_score: f64,
    pub is_available: bool,
}

impl AgentCapacity {
    pub fn new(agent_id: &str, max_concurrent_tasks: usize) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            max_concurrent_tasks,
            current_tasks: Vec::new(),
            completed_tasks: 0,
            failed_tasks: 0,
            average_duration_secs: 0.0,
            duration_samples: 0,
            performance_score: NOMINAL_PERFORMANCE,
            is_available: true,
        }
    }

    /// Held tasks over the limit, in [0, 1]. An agent with no slots is full.
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        (self.current_tasks.len() as f64 / self.max_concurrent_tasks as f64).min(1.0)
    }

    pub fn available_capacity(&self) -> usize {
        self.max_concurrent_tasks
            .saturating_sub(self.current_tasks.len())
    }

    /// Available and with at least one free slot.
    pub fn can_accept(&self) -> bool {
        self.is_available && self.available_capacity() > 0
    }

    pub fn holds(&self, task_id: &str) -> bool {
        self.current_tasks.iter().any(|t| t == task_id)
    }

    /// Take a slot. Returns false when full or already held.
    pub fn hold(&mut self, task_id: &str) -> bool {
        if self.available_capacity() == 0 || self.holds(task_id) {
            return false;
        }
        self.current_tasks.push(task_id.to_string());
        true
    }

    /// Free a slot. Returns false when the task was not held.
    pub fn release(&mut self, task_id: &str) -> bool {
        let before = self.current_tasks.len();
        self.current_tasks.retain(|t| t != task_id);
        self.current_tasks.len() < before
    }

    /// Fold one finished task into the track record.
    ///
    /// `smoothing` is the weight kept by the previous average; the first
    /// sample seeds it.
    pub fn record_outcome(&mut self, success: bool, duration_secs: f64, smoothing: f64) {
        if success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }

        let duration_secs = duration_secs.max(0.0);
        self.average_duration_secs = if self.duration_samples == 0 {
            duration_secs
        } else {
            smoothing * self.average_duration_secs + (1.0 - smoothing) * duration_secs
        };
        self.duration_samples += 1;

        self.performance_score = self.success_rate() * 2.0;
    }

    /// Completed over finished; 0.5 with no history.
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed_tasks + self.failed_tasks;
        if finished == 0 {
            NOMINAL_PERFORMANCE / 2.0
        } else {
            self.completed_tasks as f64 / finished as f64
        }
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "{} {}/{} | util={:.2} | perf={:.2} | done={} failed={}{}",
            self.agent_id,
            self.current_tasks.len(),
            self.max_concurrent_tasks,
            self.utilization(),
            self.performance_score,
            self.completed_tasks,
            self.failed_tasks,
            if self.is_available { "" } else { " | unavailable" }
        )
    }
}
