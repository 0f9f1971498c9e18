//! Error types for address lookups and cascade selection.

use thiserror::Error;

use crate::models::AddressLevel;

/// Result type for remote lookups.
pub type LookupResult<T> = Result<T, LookupError>;

/// Errors produced while talking to the address service.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request to {endpoint} failed: {reason}")]
    Upstream { endpoint: String, reason: String },

    #[error("{endpoint} answered with HTTP {status}")]
    UpstreamStatus { endpoint: String, status: u16 },

    #[error("no {0} rows returned")]
    EmptyResult(AddressLevel),

    #[error("{feature} is not configured; set {env_var}")]
    NotConfigured {
        feature: &'static str,
        env_var: &'static str,
    },

    #[error("cannot fetch {0} options before every preceding level is selected")]
    IncompleteAncestors(AddressLevel),

    #[error(transparent)]
    InvalidSelection(#[from] SelectionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LookupError {
    /// Returns true for transport failures and non-success statuses.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            LookupError::Upstream { .. } | LookupError::UpstreamStatus { .. }
        )
    }

    /// Empty results are rendered as "no data" rather than as failures.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, LookupError::EmptyResult(_))
    }
}

/// Rejected state machine transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("cannot select {level} while {missing} is unselected")]
    AncestorUnset {
        level: AddressLevel,
        missing: AddressLevel,
    },

    #[error("{value:?} is not an option for {level}")]
    NotAnOption { level: AddressLevel, value: String },
}
