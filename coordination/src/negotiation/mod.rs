//! Multi-round negotiation over proposals.
//!
//! ```text
//! Proposed ──▶ UnderReview ──┬──▶ ConsensusReached
//!                 ▲    │     ├──▶ Rejected
//!                 └────┘     ├──▶ CounterProposed
//!            (next round)    └──▶ Stalemate
//! ```

pub mod coordinator;
pub mod state;

pub use coordinator::{
    NegotiationConfig, NegotiationCoordinator, NegotiationError, NegotiationResult,
    NegotiationStatistics, FALLBACK_BENEFIT, FALLBACK_RISK,
};
pub use state::{
    NegotiationId, NegotiationRecord, NegotiationRound, NegotiationStatus, NegotiationTransition,
    Stance, StatusTransitionError,
};
