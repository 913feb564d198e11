//! Error types for Herder operations.
//!
//! Validation negatives are never errors here: they flow back through the
//! boolean callbacks the engine supplies. These errors cover construction
//! and operations the embedding application invokes directly.

use thiserror::Error;

/// Errors that can occur during Herder operations.
#[derive(Debug, Error)]
pub enum HerderError {
    /// The local quorum configuration is unusable.
    #[error("invalid quorum configuration: {0}")]
    InvalidQuorumConfig(#[from] kraal_fba::QuorumConfigError),

    /// Operation requires a validating node but the validation key is the
    /// watch-only sentinel, or the node is not configured for it.
    #[error("not in validating state")]
    NotValidating,

    /// An internal invariant failed.
    #[error("internal error: {0}")]
    Internal(String),
}
