//! Quorum arithmetic over the flat trust configuration.

use std::collections::HashSet;

use thiserror::Error;

use kraal_common::NodeId;

use crate::types::QuorumSet;

/// Problems with a quorum configuration, caught at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuorumConfigError {
    #[error("threshold must be greater than 0")]
    ZeroThreshold,

    #[error("threshold {threshold} exceeds validator count {count}")]
    ThresholdTooHigh { threshold: u32, count: usize },

    #[error("duplicate validator in quorum configuration")]
    DuplicateValidator,

    #[error("quorum configuration has no validators")]
    Empty,
}

/// Validate a quorum configuration.
pub fn is_quorum_set_sane(quorum_set: &QuorumSet) -> Result<(), QuorumConfigError> {
    if quorum_set.validators.is_empty() {
        return Err(QuorumConfigError::Empty);
    }
    if quorum_set.threshold == 0 {
        return Err(QuorumConfigError::ZeroThreshold);
    }
    if quorum_set.threshold as usize > quorum_set.validators.len() {
        return Err(QuorumConfigError::ThresholdTooHigh {
            threshold: quorum_set.threshold,
            count: quorum_set.validators.len(),
        });
    }
    let mut seen = HashSet::new();
    for validator in &quorum_set.validators {
        if !seen.insert(*validator) {
            return Err(QuorumConfigError::DuplicateValidator);
        }
    }
    Ok(())
}

/// Check whether `nodes` is a v-blocking set for `quorum_set`.
///
/// A set is v-blocking if it intersects every quorum slice, which for a
/// flat configuration means it contains at least
/// `total - threshold + 1` of the validators. No set is v-blocking for a
/// zero-threshold configuration.
pub fn is_v_blocking(quorum_set: &QuorumSet, nodes: &HashSet<NodeId>) -> bool {
    let total = quorum_set.validators.len();
    let threshold = quorum_set.threshold as usize;
    if threshold == 0 {
        return false;
    }

    let blocking_threshold = total.saturating_sub(threshold) + 1;
    let count = quorum_set
        .validators
        .iter()
        .filter(|v| nodes.contains(v))
        .count();

    count >= blocking_threshold
}
