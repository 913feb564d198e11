//! The seam between the voting engine and the application layer.
//!
//! The engine is isolated from application logic: it does not know how to
//! validate a transaction set, look up a quorum set, or talk to peers. All
//! of that is delegated through [`FbaDriver`], which the herder implements.
//! In the other direction the herder drives the engine through
//! [`FbaGateway`].
//!
//! Several driver callbacks are asynchronous by nature: validating a value
//! may require fetching its transaction set from the network first, and
//! accepting a ballot from a non-preferred proposer is deliberately
//! delayed. Those callbacks therefore take a continuation instead of
//! returning a result. The continuation may run immediately on the same
//! call stack or later from a timer or a fetch completion, always on the
//! herder's task.

use std::cmp::Ordering;
use std::sync::Arc;

use kraal_common::{Hash256, NodeId};

use crate::types::{FbaBallot, FbaEnvelope, QuorumSet, Value};
use crate::SlotIndex;

/// One-shot continuation for a validation decision.
pub type ValidationCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Continuation attached to an inbound envelope.
///
/// Envelope intake can replay the same envelope later (a future-slot
/// envelope is stashed and re-delivered when its slot opens), so this
/// callback must be invokable more than once.
pub type EnvelopeCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

/// One-shot continuation delivering a resolved quorum set.
pub type QuorumSetCallback = Box<dyn FnOnce(Arc<QuorumSet>) + Send + 'static>;

/// Callbacks the engine makes into the application layer.
pub trait FbaDriver: Send + Sync {
    /// Validate an opaque value proposed for a slot.
    ///
    /// The decision may be deferred until the value's dependencies are
    /// resolved; `cb` fires exactly once with the outcome.
    fn validate_value(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        value: &Value,
        cb: ValidationCallback,
    );

    /// Validate a ballot from a peer under the adversarial bounds.
    ///
    /// May defer acceptance behind a timer; `cb` fires at most once with
    /// the outcome.
    fn validate_ballot(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        ballot: &FbaBallot,
        cb: ValidationCallback,
    );

    /// Deterministically order two already-validated values for a round.
    fn compare_values(
        &self,
        slot_index: SlotIndex,
        ballot_counter: u32,
        v1: &Value,
        v2: &Value,
    ) -> Ordering;

    /// The engine heard from a transitive quorum for this ballot.
    fn ballot_did_hear_from_quorum(&self, slot_index: SlotIndex, ballot: &FbaBallot);

    /// Consensus was reached on a value for this slot.
    fn value_externalized(&self, slot_index: SlotIndex, value: &Value);

    /// Resolve a quorum set by hash, fetching from the network if needed.
    fn retrieve_quorum_set(&self, node_id: &NodeId, quorum_set_hash: &Hash256, cb: QuorumSetCallback);

    /// Broadcast an envelope produced by the engine.
    fn emit_envelope(&self, envelope: &FbaEnvelope);

    /// The engine touched state for this node (used for node eviction).
    fn node_touched(&self, node_id: &NodeId);
}

/// Operations the herder invokes on the engine.
pub trait FbaGateway: Send + Sync {
    /// Feed an inbound envelope to the engine.
    fn receive_envelope(&self, envelope: FbaEnvelope, cb: EnvelopeCallback);

    /// Propose a value for a slot, optionally bumping the ballot counter.
    fn prepare_value(&self, slot_index: SlotIndex, value: &Value, bump_counter: bool);

    /// Check whether the given nodes form a v-blocking set for the local
    /// configuration.
    fn is_v_blocking(&self, nodes: &[NodeId]) -> bool;

    /// Drop all engine state for a node.
    fn purge_node(&self, node_id: &NodeId);

    /// Drop all engine state for slots up to and including `max_slot_index`.
    fn purge_slots(&self, max_slot_index: SlotIndex);
}
