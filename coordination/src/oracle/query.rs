//! The single parse-or-default seam in front of the oracle.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{OracleRequest, QueryKind, ReasoningOracle};

/// An oracle request paired with the value to use when the oracle fails.
///
/// `ask` returns `(value, true)` when the oracle answered with JSON matching
/// `T`, and `(fallback, false)` otherwise. Failures are logged, never raised.
#[derive(Debug, Clone)]
pub struct StructuredQuery<T> {
    request: OracleRequest,
    fallback: T,
}

impl<T: DeserializeOwned> StructuredQuery<T> {
    pub fn new(
        kind: QueryKind,
        role_context: impl Into<String>,
        subject: serde_json::Value,
        expected_shape: impl Into<String>,
        fallback: T,
    ) -> Self {
        Self {
            request: OracleRequest {
                kind,
                role_context: role_context.into(),
                subject,
                expected_shape: expected_shape.into(),
            },
            fallback,
        }
    }

    pub fn request(&self) -> &OracleRequest {
        &self.request
    }

    pub fn fallback(&self) -> &T {
        &self.fallback
    }

    /// Ask the oracle once.
    pub async fn ask(self, oracle: &dyn ReasoningOracle) -> (T, bool) {
        let kind = self.request.kind;
        match oracle.query(&self.request).await {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(parsed) => {
                    debug!(kind = %kind, role = %self.request.role_context, "Oracle answered");
                    (parsed, true)
                }
                Err(e) => {
                    warn!(
                        kind = %kind,
                        role = %self.request.role_context,
                        error = %e,
                        "Oracle answer did not match expected shape, using fallback"
                    );
                    (self.fallback, false)
                }
            },
            Err(e) => {
                warn!(
                    kind = %kind,
                    role = %self.request.role_context,
                    error = %e,
                    "Oracle call failed, using fallback"
                );
                (self.fallback, false)
            }
        }
    }
}
