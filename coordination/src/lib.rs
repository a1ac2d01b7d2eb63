//! Agent coordination core
//!
//! Lets a fixed set of specialist agents decide on proposed changes and
//! share work under capacity limits:
//!
//! - **Negotiation** (`negotiation`): multi-round support / opposition /
//!   counter-proposal until consensus, rejection, open counters or stalemate
//! - **Consensus** (`consensus`): votes to decisions under majority,
//!   super-majority, unanimous, expertise-weighted and oracle-arbitrated rules
//! - **Scheduling** (`scheduler`): dependency-gated, capacity-aware task
//!   assignment with load rebalancing
//!
//! Every judgment call goes to a [`ReasoningOracle`] through
//! [`StructuredQuery`], which always has a documented fallback, so the core
//! keeps making progress when the oracle is slow, wrong or offline.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario against a local OpenAI-compatible endpoint
//! coordination simulate --scenario scenarios/demo.toml
//!
//! # Deterministic run with every oracle call falling back
//! coordination simulate --scenario scenarios/demo.toml --offline
//!
//! # Print the effective configuration
//! COORD_MAX_ROUNDS=3 coordination config
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod config;
pub mod consensus;
pub mod error;
pub mod events;
pub mod negotiation;
pub mod oracle;
pub mod proposal;
pub mod scheduler;
pub mod store;

pub use agents::{Agent, AgentId, AgentRoster, SharedRoster, DEFAULT_DOMAIN_WEIGHT};
pub use config::{ConfigError, ConfigResult, CoordinationConfig};
pub use consensus::{
    ConsensusConfig, ConsensusDecision, ConsensusEngine, ConsensusStrategy, DomainClassifier,
    KeywordDomainClassifier, Vote, VoteType,
};
pub use error::{CoordinationError, CoordinationResult};
pub use events::{CoordinationEvent, EventBus, EventFilter, SharedEventBus};
pub use negotiation::{
    NegotiationConfig, NegotiationCoordinator, NegotiationError, NegotiationResult,
    NegotiationStatus, Stance,
};
pub use oracle::{
    HttpOracle, OfflineOracle, OracleConfig, OracleError, OracleRequest, QueryKind,
    ReasoningOracle, SharedOracle, StructuredQuery,
};
pub use proposal::{Proposal, ProposalId, ProposalModifications, ProposalType};
pub use scheduler::{
    AgentCapacity, CapacityScheduler, RedistributionDecision, SchedulerConfig, SchedulerError,
    Task, TaskId, TaskPriority, TaskStatus, Urgency,
};
pub use store::Registry;
