//! Shared fixtures for integration tests: a scripted oracle and a roster of
//! four specialists plus an architect.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_coordination::{
    Agent, AgentRoster, OracleError, OracleRequest, QueryKind, ReasoningOracle, SharedOracle,
    SharedRoster,
};
use async_trait::async_trait;

type Script = dyn Fn(&OracleRequest) -> Option<serde_json::Value> + Send + Sync;

/// Oracle answering from a closure. `None` answers become `Unavailable`.
pub struct ScriptedOracle {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&OracleRequest) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn query(&self, request: &OracleRequest) -> Result<serde_json::Value, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(request)
            .ok_or_else(|| OracleError::Unavailable(format!("no script for {}", request.kind)))
    }
}

pub fn shared(oracle: &Arc<ScriptedOracle>) -> SharedOracle {
    oracle.clone()
}

/// Round number of a stance request, 0 for other kinds.
pub fn round_of(request: &OracleRequest) -> u64 {
    request
        .subject
        .get("round")
        .and_then(|r| r.as_u64())
        .unwrap_or(0)
}

/// Whether the request speaks as the agent with this role.
pub fn speaks_as(request: &OracleRequest, role: &str) -> bool {
    request.role_context.contains(role)
}

pub fn stance(stance: &str, argument: &str) -> serde_json::Value {
    serde_json::json!({ "stance": stance, "argument": argument })
}

pub fn vote(vote: &str, confidence: f64) -> serde_json::Value {
    serde_json::json!({ "vote": vote, "confidence": confidence, "rationale": format!("{} it", vote) })
}

pub fn is_kind(request: &OracleRequest, kind: QueryKind) -> bool {
    request.kind == kind
}

pub fn roster() -> SharedRoster {
    AgentRoster::new(vec![
        Agent::new("architect", "Software architect")
            .with_expertise("architecture", 0.9)
            .with_capacity(2),
        Agent::new("security", "Security reviewer")
            .with_expertise("security", 0.9)
            .with_capacity(2),
        Agent::new("performance", "Performance engineer")
            .with_expertise("performance", 0.9)
            .with_expertise("security", 0.2)
            .with_capacity(2),
        Agent::new("qa", "Test engineer")
            .with_expertise("testing", 0.8)
            .with_expertise("security", 0.2)
            .with_capacity(2),
        Agent::new("ops", "Operations engineer")
            .with_expertise("infrastructure", 0.8)
            .with_capacity(2),
    ])
    .shared()
}

pub fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
