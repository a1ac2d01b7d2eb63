//! Capacity-aware task scheduling.
//!
//! ```text
//! Pending ──▶ Assigned ──▶ InProgress ──┬──▶ Completed
//!    │           │                      └──▶ Failed
//!    └───────────┴──▶ Redistributed ──▶ Assigned (new agent)
//! ```
//!
//! Assignment is gated on dependencies and per-agent slots. Every
//! completion frees a slot and runs one rebalancing pass.

pub mod capacity;
pub mod engine;
pub mod task;

pub use capacity::{AgentCapacity, NOMINAL_PERFORMANCE};
pub use engine::{
    AgentSummary, CapacityScheduler, CompletionReport, SchedulerConfig, SchedulerError,
    SchedulerResult, SchedulerStatistics,
};
pub use task::{
    RedistributionDecision, Task, TaskId, TaskPriority, TaskStatus, TaskTransition,
    TaskTransitionError, Urgency,
};
