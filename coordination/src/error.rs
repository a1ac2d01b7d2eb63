//! Crate-level error aggregating the component errors.

use crate::config::ConfigError;
use crate::events::EventBusError;
use crate::negotiation::NegotiationError;
use crate::oracle::OracleError;
use crate::scheduler::SchedulerError;

/// Any error a coordination caller may see.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),
}

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_convert() {
        let err: CoordinationError = SchedulerError::TaskNotFound("task-3".to_string()).into();
        assert!(matches!(err, CoordinationError::Scheduler(_)));
        assert_eq!(err.to_string(), "Task not found: task-3");

        let err: CoordinationError =
            NegotiationError::ProposalNotFound("proposal-2".to_string()).into();
        assert_eq!(err.to_string(), "Proposal not found: proposal-2");
    }
}
