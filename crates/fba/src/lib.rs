//! Federated Byzantine agreement interface types for the kraal node.
//!
//! The voting engine itself lives outside this workspace; what this crate
//! defines is the seam between it and the herder:
//!
//! - the data carried by the protocol ([`Value`], [`FbaBallot`],
//!   [`FbaEnvelope`], [`QuorumSet`])
//! - quorum arithmetic the herder relies on ([`is_v_blocking`],
//!   [`is_quorum_set_sane`])
//! - the [`FbaDriver`] callbacks the herder implements and the
//!   [`FbaGateway`] operations it invokes on the engine
//!
//! ## Key concepts
//!
//! - **Slot**: one ledger-sequence position, one agreement instance
//! - **Ballot**: a `(counter, value)` pair voted on within a slot
//! - **Quorum set**: the local trust configuration, a threshold over a
//!   flat list of validator ids
//! - **V-blocking set**: a node set intersecting every quorum slice of the
//!   local configuration; if all of them ask for the same thing, following
//!   them is safe under the trust assumption

mod driver;
mod quorum;
mod types;

pub use driver::{
    EnvelopeCallback, FbaDriver, FbaGateway, QuorumSetCallback, ValidationCallback,
};
pub use quorum::{is_quorum_set_sane, is_v_blocking, QuorumConfigError};
pub use types::{FbaBallot, FbaEnvelope, FbaStatement, QuorumSet, Value};

/// A slot index (the ledger sequence number being agreed on).
pub type SlotIndex = u64;
