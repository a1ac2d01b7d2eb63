//! Reasoning oracle boundary.
//!
//! The oracle is the external reasoning service that turns a structured
//! request (role context, subject payload, expected answer shape) into a
//! structured judgment. It is slow and unreliable: every call site goes
//! through [`StructuredQuery`], which pairs the request with an explicit
//! fallback value and never lets an oracle failure escape.
//!
//! ```text
//! call site ──▶ StructuredQuery<T> { request, fallback }
//!                    │
//!                    ├─ oracle answers, JSON fits T → (answer, true)
//!                    └─ request fails / shape mismatch → (fallback, false)
//! ```

pub mod http;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{HttpOracle, OracleConfig};
pub use query::StructuredQuery;

/// Error type for oracle calls
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    RequestFailed(String),

    #[error("Oracle response parse error: {0}")]
    ParseError(String),

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Result type for oracle calls
pub type OracleResult<T> = Result<T, OracleError>;

/// What a request asks the oracle to do. Each kind has its own answer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Flesh out a new proposal (rationale, benefits, risks, impact, approach).
    DraftProposal,
    /// One agent's vote on a proposal.
    CastVote,
    /// One agent's stance during a negotiation round.
    EvaluateStance,
    /// Pick the strongest counter-proposal of a round.
    SelectCounterProposal,
    /// Decide a proposal given the full vote set.
    ArbitrateDecision,
    /// Pick the best agent for a task among candidates.
    RankAgents,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DraftProposal => write!(f, "draft_proposal"),
            Self::CastVote => write!(f, "cast_vote"),
            Self::EvaluateStance => write!(f, "evaluate_stance"),
            Self::SelectCounterProposal => write!(f, "select_counter_proposal"),
            Self::ArbitrateDecision => write!(f, "arbitrate_decision"),
            Self::RankAgents => write!(f, "rank_agents"),
        }
    }
}

/// A structured oracle request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Kind of judgment requested
    pub kind: QueryKind,
    /// Who is asking (the agent role the oracle should speak as)
    pub role_context: String,
    /// The material to judge
    pub subject: serde_json::Value,
    /// Description of the JSON object the answer must be
    pub expected_shape: String,
}

/// The external reasoning service.
///
/// Implementations make at most one attempt per call and do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Answer a request with a JSON judgment.
    async fn query(&self, request: &OracleRequest) -> OracleResult<serde_json::Value>;
}

/// Shared reference to an oracle
pub type SharedOracle = Arc<dyn ReasoningOracle>;

/// Oracle that is never reachable. Every call site takes its fallback, which
/// makes the whole core deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

impl OfflineOracle {
    pub fn shared() -> SharedOracle {
        Arc::new(Self)
    }
}

#[async_trait]
impl ReasoningOracle for OfflineOracle {
    async fn query(&self, request: &OracleRequest) -> OracleResult<serde_json::Value> {
        Err(OracleError::Unavailable(format!(
            "offline mode, {} not sent",
            request.kind
        )))
    }
}
