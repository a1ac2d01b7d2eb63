//! Coordination configuration.
//!
//! Loaded from TOML, every section optional:
//!
//! ```toml
//! [negotiation]
//! max_rounds = 5
//! consensus_threshold = 0.7
//! stance_fallback = "support"
//!
//! [consensus]
//! default_strategy = "weighted"
//!
//! [scheduler]
//! default_max_concurrent_tasks = 3
//! dispatch_on_completion = false
//!
//! [oracle]
//! endpoint = "http://localhost:8000/v1/chat/completions"
//! model = "default"
//! ```
//!
//! `COORD_*` environment variables override file values.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consensus::{ConsensusConfig, ConsensusStrategy};
use crate::negotiation::{NegotiationConfig, Stance};
use crate::oracle::OracleConfig;
use crate::scheduler::SchedulerConfig;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// All component settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub negotiation: NegotiationConfig,
    pub consensus: ConsensusConfig,
    pub scheduler: SchedulerConfig,
    pub oracle: OracleConfig,
}

impl CoordinationConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `COORD_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are logged
    /// and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = parsed(&lookup, "COORD_MAX_ROUNDS") {
            self.negotiation.max_rounds = n;
        }
        if let Some(v) = parsed(&lookup, "COORD_CONSENSUS_THRESHOLD") {
            self.negotiation.consensus_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "COORD_REJECTION_THRESHOLD") {
            self.negotiation.rejection_threshold = v;
        }
        if let Some(val) = lookup("COORD_STANCE_FALLBACK") {
            match Stance::parse(&val) {
                Some(stance) => self.negotiation.stance_fallback = stance,
                None => warn!(key = "COORD_STANCE_FALLBACK", value = %val, "Ignoring unknown stance"),
            }
        }
        if let Some(val) = lookup("COORD_DEFAULT_STRATEGY") {
            self.consensus.default_strategy = ConsensusStrategy::from_str_lenient(&val);
        }
        if let Some(n) = parsed(&lookup, "COORD_MAX_CONCURRENT_TASKS") {
            self.scheduler.default_max_concurrent_tasks = n;
        }
        if let Some(val) = lookup("COORD_DISPATCH_ON_COMPLETION") {
            self.scheduler.dispatch_on_completion = is_truthy(&val);
        }
        if let Some(url) = lookup("COORD_ORACLE_URL") {
            self.oracle.endpoint = url;
        }
        if let Some(model) = lookup("COORD_ORACLE_MODEL") {
            self.oracle.model = model;
        }
        if let Some(key) = lookup("COORD_ORACLE_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Some(n) = parsed(&lookup, "COORD_ORACLE_TIMEOUT_SECS") {
            self.oracle.timeout_secs = n;
        }
        if let Some(val) = lookup("COORD_OFFLINE") {
            self.oracle.offline = is_truthy(&val);
        }
    }

    /// Check ranges and threshold ordering.
    pub fn validate(&self) -> ConfigResult<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };

        let n = &self.negotiation;
        if n.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "negotiation.max_rounds must be at least 1".to_string(),
            ));
        }
        unit("negotiation.consensus_threshold", n.consensus_threshold)?;
        unit("negotiation.rejection_threshold", n.rejection_threshold)?;
        if n.rejection_threshold > n.consensus_threshold {
            return Err(ConfigError::Invalid(format!(
                "negotiation.rejection_threshold ({}) exceeds consensus_threshold ({})",
                n.rejection_threshold, n.consensus_threshold
            )));
        }

        let c = &self.consensus;
        unit("consensus.simple_majority_threshold", c.simple_majority_threshold)?;
        unit("consensus.super_majority_threshold", c.super_majority_threshold)?;
        unit("consensus.weighted_threshold", c.weighted_threshold)?;
        unit("consensus.negotiated_threshold", c.negotiated_threshold)?;
        unit("consensus.fallback_vote_confidence", c.fallback_vote_confidence)?;

        let s = &self.scheduler;
        unit("scheduler.overload_threshold", s.overload_threshold)?;
        unit("scheduler.underload_threshold", s.underload_threshold)?;
        unit("scheduler.duration_smoothing", s.duration_smoothing)?;
        if s.underload_threshold >= s.overload_threshold {
            return Err(ConfigError::Invalid(format!(
                "scheduler.underload_threshold ({}) must be below overload_threshold ({})",
                s.underload_threshold, s.overload_threshold
            )));
        }

        if !self.oracle.offline && self.oracle.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "oracle.endpoint is empty; set it or enable oracle.offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
