//! Consensus: turning a set of agent votes into a decision.
//!
//! Strategies:
//! - **Simple / super majority**: approvals over approve+reject votes, any veto rejects
//! - **Unanimous**: every non-abstaining vote approves
//! - **Weighted**: expertise in the proposal's domain × confidence
//! - **Oracle arbitration**: the oracle rules, simple majority when it cannot
//! - **Negotiated**: the support-threshold rule that seals negotiations

pub mod domain;
pub mod engine;
pub mod types;

pub use domain::{
    DomainClassifier, FixedDomainClassifier, KeywordDomainClassifier, SharedClassifier,
    GENERAL_DOMAIN,
};
pub use engine::{
    majority_decision, support_threshold_decision, unanimous_decision, ConsensusConfig,
    ConsensusEngine,
};
pub use types::{ConsensusDecision, ConsensusStrategy, Vote, VoteTally, VoteType};
