use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building, compiling or solving one optimization cycle.
///
/// Every variant is recovered at the boundary of a cycle: a failure never
/// replaces the previously published solution.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data for `{element}`: {reason}")]
    DataInsufficiency { element: String, reason: String },

    #[error("Model is infeasible")]
    Infeasible,

    #[error("Model is unbounded: {0}")]
    Unbounded(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Optimization cycle cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NetworkError {
    pub fn configuration(desc: impl Into<String>) -> Self {
        Self::Configuration(desc.into())
    }

    pub fn data(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataInsufficiency {
            element: element.into(),
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled cycle may succeed without a configuration
    /// change. Nothing is ever retried within the same cycle.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::DataInsufficiency { .. } | Self::Solver(_) | Self::Cancelled
        )
    }

    /// Status published for the network when a cycle ends with this error.
    pub fn status(&self) -> NetworkStatus {
        match self {
            Self::Configuration(_) => NetworkStatus::InvalidConfiguration,
            Self::DataInsufficiency { .. } => NetworkStatus::DataInsufficient,
            Self::Infeasible => NetworkStatus::Infeasible,
            Self::Unbounded(_) => NetworkStatus::Unbounded,
            Self::Solver(_) | Self::Internal(_) => NetworkStatus::SolverError,
            Self::Cancelled => NetworkStatus::Pending,
        }
    }
}

/// Network-level status as published to the host platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NetworkStatus {
    Pending,
    Optimal,
    Infeasible,
    Unbounded,
    SolverError,
    DataInsufficient,
    InvalidConfiguration,
}
