//! The Herder: slot driver and engine-facing facade.
//!
//! One instance participates in consensus for one node. It owns the
//! pending transaction pool, the dependency resolvers, the per-slot
//! timers, and implements every [`FbaDriver`] callback the engine needs.
//!
//! # Slot lifecycle
//!
//! After each ledger close (when synced and validating) the trigger timer
//! arms for the remainder of the target ledger timespan. On fire, the
//! herder snapshots the pool into a transaction set, signs a ballot value
//! over it, and hands the value to the engine. Peer ballots are validated
//! under the adversarial bounds below; when the engine hears from a
//! quorum, a bump timer arms so a stuck round eventually escalates its
//! counter. Externalization commits the set to the ledger, rotates the
//! tx-set resolvers and the pool, and garbage-collects idle nodes and old
//! slots.
//!
//! # Adversarial bounds
//!
//! - close times may not be more than [`MAX_TIME_SLIP_SECONDS`] ahead of
//!   local time
//! - ballot counters may not outrun the wall clock: counter `c` implies
//!   the sum of the first `c` round timeouts has elapsed since our last
//!   trigger, give or take the slip
//! - fees must stay within a factor of two of the configured fee
//! - ballots from proposers that are not the round king (or not trusted)
//!   are accepted only after a delay, or early once a v-blocking set of
//!   peers is asking for the same ballot
//!
//! # Threading
//!
//! All state lives behind short-lived `parking_lot` locks; timer tasks
//! re-enter through a `Weak` handle and find the herder gone if it has
//! shut down. Construction requires a tokio runtime for timer spawning.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use kraal_common::time::current_timestamp;
use kraal_common::{Hash256, NodeId, PeerId};
use kraal_crypto::SecretKey;
use kraal_fba::{
    is_quorum_set_sane, EnvelopeCallback, FbaBallot, FbaDriver, FbaEnvelope, FbaGateway,
    QuorumSet, QuorumSetCallback, SlotIndex, ValidationCallback, Value,
};

use crate::ballot::{compare_signed_values, rank_node, BallotValue, SignedBallotValue};
use crate::error::HerderError;
use crate::fetcher::ItemResolver;
use crate::gateways::{LedgerGateway, LedgerHeader, Message, OverlayGateway};
use crate::state::HerderState;
use crate::timers::{OneshotTimer, SharedCallback};
use crate::tx::Transaction;
use crate::tx_pool::TxPool;
use crate::tx_set::TxSet;
use crate::Result;

/// Maximum seconds a proposed close time may run ahead of local time.
pub const MAX_TIME_SLIP_SECONDS: u64 = 60;

/// Cap on a single consensus round timeout, in seconds.
pub const MAX_FBA_TIMEOUT_SECONDS: u64 = 240;

/// Target seconds between ledger triggers.
pub const EXP_LEDGER_TIMESPAN_SECONDS: u64 = 5;

/// Envelopes outside this many slots of the last closed ledger are dropped
/// when fully synced, and engine state older than the bracket is purged.
pub const LEDGER_VALIDITY_BRACKET: u64 = 100;

/// Nodes untouched by the engine for this long are evicted at
/// externalization.
pub const NODE_EXPIRATION_SECONDS: u64 = 240;

/// Ledgers to observe after syncing before proposing values.
pub const LEDGERS_TO_WAIT_TO_PARTICIPATE: u32 = 3;

/// Round timeout in seconds for a given ballot counter: `2^counter`,
/// saturating at [`MAX_FBA_TIMEOUT_SECONDS`].
fn fba_timeout_seconds(counter: u32) -> u64 {
    if counter >= 63 {
        return MAX_FBA_TIMEOUT_SECONDS;
    }
    (1u64 << counter).min(MAX_FBA_TIMEOUT_SECONDS)
}

/// Check the ballot counter against wall-clock elapsed time.
///
/// A counter of `c` is plausible only if the cumulative round timeouts for
/// counters `0..c` fit between our last trigger and now, allowing
/// [`MAX_TIME_SLIP_SECONDS`] of error. The loop stops as soon as the
/// cumulative sum passes the horizon, so a huge counter costs a handful of
/// iterations, not `c`.
fn counter_within_growth_bound(counter: u32, time_now: u64, last_trigger: u64) -> bool {
    let horizon = time_now + MAX_TIME_SLIP_SECONDS;
    let mut sum: u64 = 0;
    let mut i: u32 = 0;
    while i < counter && horizon >= last_trigger.saturating_add(sum) {
        sum = sum.saturating_add(fba_timeout_seconds(i));
        i += 1;
    }
    horizon >= last_trigger.saturating_add(sum)
}

/// Configuration for the Herder.
#[derive(Clone)]
pub struct HerderConfig {
    /// Validation key. The all-zero seed makes this a watch-only node that
    /// validates and tracks but never proposes.
    pub validation_key: SecretKey,
    /// Agreement threshold over the validator list.
    pub quorum_threshold: u32,
    /// Validator ids this node trusts.
    pub quorum_set: Vec<NodeId>,
    /// Fee per operation this node wants in proposed values.
    pub desired_base_fee: u32,
    /// Whether this node starts a new network instead of joining one.
    pub start_new_network: bool,
}

/// A deferred ballot acceptance: the timer and the callback it will fire.
struct DeferredValidation {
    _timer: OneshotTimer,
    callback: SharedCallback,
}

type TxSetWaiter = Box<dyn FnOnce(Arc<TxSet>) + Send + 'static>;

/// The consensus-participation core of the node.
///
/// Create with [`Herder::new`], attach the engine with
/// [`Herder::set_fba_gateway`], then feed it overlay traffic
/// (`recv_*` methods) and ledger closes.
pub struct Herder {
    config: HerderConfig,
    local_node_id: NodeId,
    local_quorum_set: QuorumSet,

    state: RwLock<HerderState>,
    ledgers_to_wait: Mutex<u32>,
    last_closed_ledger: RwLock<LedgerHeader>,
    /// Monotonic instant and unix seconds of our last proposal trigger.
    last_trigger: Mutex<(Instant, u64)>,
    /// The signed value we are currently proposing, encoded.
    current_value: Mutex<Option<Value>>,

    tx_pool: Mutex<TxPool>,
    /// Double-buffered tx-set resolvers; `current_tx_set_fetcher` indexes
    /// the active one, flipped on each externalization.
    tx_set_resolvers: [ItemResolver<TxSet>; 2],
    current_tx_set_fetcher: AtomicUsize,
    qset_resolver: ItemResolver<QuorumSet>,

    tx_set_waiters: Mutex<HashMap<Hash256, Vec<TxSetWaiter>>>,
    qset_waiters: Mutex<HashMap<Hash256, Vec<QuorumSetCallback>>>,

    /// Deferred-accept timers, one per (ballot, requesting peer).
    ballot_timers: Mutex<HashMap<FbaBallot, HashMap<NodeId, DeferredValidation>>>,
    /// Single bump timer, rearmed each time the engine hears from quorum.
    bump_timer: Mutex<Option<OneshotTimer>>,
    trigger_timer: Mutex<Option<OneshotTimer>>,

    /// Envelopes for slots ahead of ours, replayed when the slot opens.
    future_envelopes: Mutex<BTreeMap<SlotIndex, Vec<(FbaEnvelope, EnvelopeCallback)>>>,
    /// Last time the engine touched each node, for eviction.
    node_last_access: Mutex<HashMap<NodeId, Instant>>,

    fba: RwLock<Option<Arc<dyn FbaGateway>>>,
    ledger: Arc<dyn LedgerGateway>,
    overlay: Arc<dyn OverlayGateway>,

    weak_self: Weak<Herder>,
}

impl Herder {
    /// Create a herder wired to its ledger and overlay collaborators.
    ///
    /// Seeds the quorum-set resolver with the local configuration so
    /// lookups of our own quorum set never touch the network. Must be
    /// called within a tokio runtime.
    pub fn new(
        config: HerderConfig,
        ledger: Arc<dyn LedgerGateway>,
        overlay: Arc<dyn OverlayGateway>,
    ) -> Result<Arc<Self>> {
        let local_quorum_set = QuorumSet {
            threshold: config.quorum_threshold,
            validators: config.quorum_set.clone(),
        };
        is_quorum_set_sane(&local_quorum_set).map_err(HerderError::InvalidQuorumConfig)?;

        let local_node_id = config.validation_key.public_key().node_id();
        let last_closed_ledger = ledger.last_closed_ledger();

        let tx_request = |overlay: &Arc<dyn OverlayGateway>| -> crate::fetcher::RequestFn {
            let overlay = overlay.clone();
            Box::new(move |hash| overlay.broadcast(Message::GetTxSet(hash)))
        };
        let qset_request: crate::fetcher::RequestFn = {
            let overlay = overlay.clone();
            Box::new(move |hash| overlay.broadcast(Message::GetQuorumSet(hash)))
        };

        let herder = Arc::new_cyclic(|weak| Self {
            local_node_id,
            local_quorum_set: local_quorum_set.clone(),
            state: RwLock::new(HerderState::Booting),
            ledgers_to_wait: Mutex::new(LEDGERS_TO_WAIT_TO_PARTICIPATE),
            last_closed_ledger: RwLock::new(last_closed_ledger),
            last_trigger: Mutex::new((Instant::now(), current_timestamp())),
            current_value: Mutex::new(None),
            tx_pool: Mutex::new(TxPool::new()),
            tx_set_resolvers: [
                ItemResolver::new("txset", tx_request(&overlay)),
                ItemResolver::new("txset", tx_request(&overlay)),
            ],
            current_tx_set_fetcher: AtomicUsize::new(0),
            qset_resolver: ItemResolver::new("qset", qset_request),
            tx_set_waiters: Mutex::new(HashMap::new()),
            qset_waiters: Mutex::new(HashMap::new()),
            ballot_timers: Mutex::new(HashMap::new()),
            bump_timer: Mutex::new(None),
            trigger_timer: Mutex::new(None),
            future_envelopes: Mutex::new(BTreeMap::new()),
            node_last_access: Mutex::new(HashMap::new()),
            fba: RwLock::new(None),
            ledger,
            overlay,
            weak_self: weak.clone(),
            config,
        });

        herder
            .qset_resolver
            .deliver(local_quorum_set.hash(), Arc::new(local_quorum_set));

        Ok(herder)
    }

    /// Attach the consensus engine. Required before any envelope or ledger
    /// traffic reaches the herder.
    pub fn set_fba_gateway(&self, fba: Arc<dyn FbaGateway>) {
        *self.fba.write() = Some(fba);
    }

    fn fba(&self) -> Arc<dyn FbaGateway> {
        self.fba
            .read()
            .clone()
            .expect("FBA engine not attached to herder")
    }

    /// Start a brand new network: no ledgers to wait for, propose now.
    pub fn bootstrap(&self) -> Result<()> {
        if self.config.validation_key.is_zero() || !self.config.start_new_network {
            return Err(HerderError::NotValidating);
        }
        *self.last_closed_ledger.write() = self.ledger.last_closed_ledger();
        *self.ledgers_to_wait.lock() = 0;
        *self.state.write() = HerderState::Synced;
        self.trigger_next_ledger();
        Ok(())
    }

    /// Current synchronization state.
    pub fn state(&self) -> HerderState {
        *self.state.read()
    }

    /// Move to a new synchronization state; illegal transitions are
    /// ignored with a warning.
    pub fn set_state(&self, next: HerderState) {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            debug!(from = %*state, to = %next, "herder state change");
            *state = next;
        } else {
            warn!(from = %*state, to = %next, "ignoring illegal state transition");
        }
    }

    /// Fully synced means the participation countdown has run out.
    pub fn fully_synced(&self) -> bool {
        *self.ledgers_to_wait.lock() == 0
    }

    /// Ledgers still to observe before we participate.
    pub fn ledgers_to_wait(&self) -> u32 {
        *self.ledgers_to_wait.lock()
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    // --- Overlay intake ---

    /// A transaction arrived from the overlay. Returns whether it was
    /// admitted to the pool.
    pub fn recv_transaction(&self, tx: Arc<Transaction>) -> bool {
        self.tx_pool.lock().recv(tx, &*self.ledger)
    }

    /// An engine envelope arrived from the overlay.
    ///
    /// When fully synced, envelopes outside the validity bracket are
    /// dropped and envelopes for future slots are additionally stashed for
    /// replay when their slot opens. While catching up the bracket is not
    /// enforced; a syncing node has to tolerate a wider window.
    pub fn recv_fba_envelope(&self, envelope: FbaEnvelope, cb: EnvelopeCallback) {
        let slot = envelope.statement.slot_index;
        if self.fully_synced() {
            let lcl = *self.last_closed_ledger.read();
            let min_slot = lcl.ledger_seq.saturating_sub(LEDGER_VALIDITY_BRACKET);
            let max_slot = lcl.ledger_seq + LEDGER_VALIDITY_BRACKET;
            if slot < min_slot || slot > max_slot {
                debug!(slot, min_slot, max_slot, "envelope outside validity bracket");
                return;
            }
            if slot > lcl.ledger_seq + 1 {
                self.future_envelopes
                    .lock()
                    .entry(slot)
                    .or_default()
                    .push((envelope.clone(), cb.clone()));
            }
        }
        self.fba().receive_envelope(envelope, cb);
    }

    /// A transaction set arrived, from the overlay or built locally.
    ///
    /// The set is cached either way; if a fetch was in flight for it, its
    /// transactions are absorbed into the pool and any validations parked
    /// on the hash resume.
    pub fn recv_tx_set(&self, tx_set: TxSet) {
        let tx_set = Arc::new(tx_set);
        let hash = tx_set.content_hash();
        let waited = self.active_tx_set_resolver().deliver(hash, tx_set.clone());
        if waited {
            for tx in tx_set.transactions() {
                self.recv_transaction(tx.clone());
            }
            let waiters = self.tx_set_waiters.lock().remove(&hash);
            if let Some(waiters) = waiters {
                for waiter in waiters {
                    waiter(tx_set.clone());
                }
            }
        }
    }

    /// A quorum set arrived from the overlay.
    pub fn recv_quorum_set(&self, quorum_set: QuorumSet) {
        let hash = quorum_set.hash();
        debug!(qset = %hash.short_hex(), "received quorum set");
        let quorum_set = Arc::new(quorum_set);
        let waited = self.qset_resolver.deliver(hash, quorum_set.clone());
        if waited {
            let waiters = self.qset_waiters.lock().remove(&hash);
            if let Some(waiters) = waiters {
                for waiter in waiters {
                    waiter(quorum_set.clone());
                }
            }
        }
    }

    /// A peer answered that it does not have a transaction set.
    pub fn doesnt_have_tx_set(&self, hash: Hash256, peer: PeerId) {
        self.active_tx_set_resolver().mark_absent(hash, peer);
    }

    /// A peer answered that it does not have a quorum set.
    pub fn doesnt_have_quorum_set(&self, hash: Hash256, peer: PeerId) {
        self.qset_resolver.mark_absent(hash, peer);
    }

    // --- Ledger intake ---

    /// The ledger layer closed a ledger.
    ///
    /// Updates the snapshot, drops deferred ballot validations for the old
    /// slot (their outcome is moot), runs the participation countdown, and
    /// schedules the next proposal trigger if this node validates.
    pub fn ledger_closed(&self, header: LedgerHeader) {
        trace!(seq = header.ledger_seq, hash = %header.hash.short_hex(), "ledger closed");
        *self.last_closed_ledger.write() = header;

        // Entering a new slot invalidates every pending deferred accept;
        // timers are cancelled and their callbacks dropped unfired.
        self.ballot_timers.lock().clear();

        {
            let mut wait = self.ledgers_to_wait.lock();
            if *wait > 0 && *self.state.read() == HerderState::Synced {
                *wait -= 1;
            }
        }

        // Watch-only nodes track consensus but never drive it.
        if self.config.validation_key.is_zero() {
            return;
        }
        if *self.ledgers_to_wait.lock() > 0 {
            return;
        }

        if let Some(mut timer) = self.trigger_timer.lock().take() {
            timer.cancel();
        }
        let elapsed = self.last_trigger.lock().0.elapsed();
        let delay = Duration::from_secs(EXP_LEDGER_TIMESPAN_SECONDS).saturating_sub(elapsed);
        let weak = self.weak_self.clone();
        let timer = OneshotTimer::spawn(delay, move || {
            if let Some(herder) = weak.upgrade() {
                herder.trigger_next_ledger();
            }
        });
        *self.trigger_timer.lock() = Some(timer);
    }

    /// Propose a value for the next slot.
    ///
    /// Snapshots the pool into a fresh set chained to the last closed
    /// ledger, makes it locally resolvable, signs a ballot value over it,
    /// and hands it to the engine. Stashed envelopes for the slot are then
    /// replayed in arrival order.
    pub fn trigger_next_ledger(&self) {
        let now_unix = current_timestamp();
        *self.last_trigger.lock() = (Instant::now(), now_unix);

        let lcl = *self.last_closed_ledger.read();
        let txs = self.tx_pool.lock().snapshot();
        let proposed = TxSet::new(lcl.hash, txs);
        let tx_set_hash = proposed.content_hash();
        let tx_count = proposed.len();
        self.recv_tx_set(proposed);

        let slot_index = lcl.ledger_seq + 1;

        // The close time is our trigger time, unless that does not advance
        // past the last close.
        let mut close_time = now_unix;
        if close_time <= lcl.close_time {
            close_time = lcl.close_time + 1;
        }

        let signed = SignedBallotValue::sign(
            BallotValue {
                tx_set_hash,
                close_time,
                base_fee: self.config.desired_base_fee,
            },
            &self.config.validation_key,
        );
        let value = signed.encode();
        *self.current_value.lock() = Some(value.clone());

        debug!(
            slot = slot_index,
            txs = tx_count,
            set = %tx_set_hash.short_hex(),
            close_time,
            "proposing value"
        );

        // If we are king the ballot will be validated; if not it is simply
        // ignored by peers until our turn comes.
        self.fba().prepare_value(slot_index, &value, false);

        let stashed = self.future_envelopes.lock().remove(&slot_index);
        if let Some(stashed) = stashed {
            for (envelope, cb) in stashed {
                self.recv_fba_envelope(envelope, cb);
            }
        }
    }

    /// The bump timer expired: re-enter the engine with our current value,
    /// bumping the ballot counter.
    fn expire_ballot(&self, slot_index: SlotIndex) {
        let lcl_seq = self.last_closed_ledger.read().ledger_seq;
        assert_eq!(
            slot_index,
            lcl_seq + 1,
            "ballot expiry for a slot we are not on"
        );

        let value = self.current_value.lock().clone();
        if let Some(value) = value {
            self.fba().prepare_value(slot_index, &value, true);
        }
    }

    /// Look up a transaction set in the active resolver.
    pub fn fetch_tx_set(&self, hash: Hash256, ask_network: bool) -> Option<Arc<TxSet>> {
        self.active_tx_set_resolver().fetch(hash, ask_network)
    }

    fn active_tx_set_resolver(&self) -> &ItemResolver<TxSet> {
        &self.tx_set_resolvers[self.current_tx_set_fetcher.load(AtomicOrdering::SeqCst)]
    }

    /// Index of the active tx-set resolver; flips on externalization.
    pub fn active_tx_set_fetcher(&self) -> usize {
        self.current_tx_set_fetcher.load(AtomicOrdering::SeqCst)
    }

    /// Number of transactions pending across all pool generations.
    pub fn tx_pool_len(&self) -> usize {
        self.tx_pool.lock().len()
    }

    pub fn tx_pool_contains(&self, tx_id: &Hash256) -> bool {
        self.tx_pool.lock().contains(tx_id)
    }

    /// Deferred ballot validations currently parked on timers.
    pub fn deferred_validation_count(&self) -> usize {
        self.ballot_timers.lock().values().map(HashMap::len).sum()
    }

    /// Whether the bump timer is armed.
    pub fn bump_timer_armed(&self) -> bool {
        self.bump_timer.lock().is_some()
    }

    /// Envelopes stashed for future slots.
    pub fn future_envelope_count(&self) -> usize {
        self.future_envelopes.lock().values().map(Vec::len).sum()
    }
}

impl FbaDriver for Herder {
    /// Validate an opaque value for a slot.
    ///
    /// Decode and signature failures are immediate negatives. When fully
    /// synced the value must be for the very next slot and advance the
    /// close time. Finally the referenced transaction set must pass
    /// validation; if it is not resident yet, the decision parks until the
    /// fetch completes.
    fn validate_value(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        value: &Value,
        cb: ValidationCallback,
    ) {
        let signed = match SignedBallotValue::decode(value) {
            Ok(signed) => signed,
            Err(err) => {
                debug!(slot = slot_index, node = %node_id, %err, "malformed value");
                return cb(false);
            }
        };
        if !signed.verify() {
            debug!(slot = slot_index, node = %node_id, "value signature invalid");
            return cb(false);
        }

        // Checks against the last closed ledger only make sense once we
        // are following the tip.
        if self.fully_synced() {
            let lcl = *self.last_closed_ledger.read();
            if lcl.ledger_seq + 1 != slot_index {
                debug!(slot = slot_index, lcl = lcl.ledger_seq, "value for wrong slot");
                return cb(false);
            }
            if signed.value.close_time <= lcl.close_time {
                debug!(slot = slot_index, "value close time does not advance");
                return cb(false);
            }
        }

        let weak = self.weak_self.clone();
        let from = *node_id;
        let check: TxSetWaiter = Box::new(move |tx_set: Arc<TxSet>| {
            let Some(herder) = weak.upgrade() else {
                return;
            };
            if herder.fully_synced() && !tx_set.check_valid(&*herder.ledger) {
                debug!(
                    slot = slot_index,
                    node = %from,
                    set = %tx_set.content_hash().short_hex(),
                    "invalid tx set"
                );
                cb(false)
            } else {
                debug!(
                    slot = slot_index,
                    node = %from,
                    set = %tx_set.content_hash().short_hex(),
                    "tx set ok"
                );
                cb(true)
            }
        });

        match self.fetch_tx_set(signed.value.tx_set_hash, true) {
            Some(tx_set) => check(tx_set),
            None => {
                self.tx_set_waiters
                    .lock()
                    .entry(signed.value.tx_set_hash)
                    .or_default()
                    .push(check);
            }
        }
    }

    /// Validate a peer's ballot under the adversarial bounds.
    fn validate_ballot(
        &self,
        slot_index: SlotIndex,
        node_id: &NodeId,
        ballot: &FbaBallot,
        cb: ValidationCallback,
    ) {
        let signed = match SignedBallotValue::decode(&ballot.value) {
            Ok(signed) => signed,
            Err(err) => {
                debug!(slot = slot_index, node = %node_id, %err, "malformed ballot value");
                return cb(false);
            }
        };
        if !signed.verify() {
            return cb(false);
        }

        let time_now = current_timestamp();
        if signed.value.close_time > time_now + MAX_TIME_SLIP_SECONDS {
            debug!(
                slot = slot_index,
                close_time = signed.value.close_time,
                "ballot close time too far in the future"
            );
            return cb(false);
        }

        // Ballots whose counter outruns the expected timeout series are an
        // exhaustion attack, not a slow network.
        let last_trigger = self.last_trigger.lock().1;
        if !counter_within_growth_bound(ballot.counter, time_now, last_trigger) {
            debug!(
                slot = slot_index,
                counter = ballot.counter,
                "ballot counter growing faster than wall clock allows"
            );
            return cb(false);
        }

        let desired = self.config.desired_base_fee as u64;
        let fee = signed.value.base_fee as u64;
        if fee * 2 < desired || fee > desired * 2 {
            debug!(slot = slot_index, fee, desired, "ballot fee out of range");
            return cb(false);
        }

        // A watch-only node must not ratify ballots attributed to itself.
        if self.config.validation_key.is_zero() && *node_id == self.local_node_id {
            return cb(false);
        }

        // The set contents are the round king's call; what we check is
        // whether this ballot plausibly comes from the king and a signer
        // we trust.
        let proposer_rank = rank_node(slot_index, ballot.counter, &signed.node_id);
        let mut is_king = true;
        let mut is_trusted = signed.node_id == self.local_node_id;
        for validator in &self.local_quorum_set.validators {
            if signed.node_id == *validator {
                is_trusted = true;
            }
            if proposer_rank > rank_node(slot_index, ballot.counter, validator) {
                is_king = false;
            }
        }

        debug!(
            slot = slot_index,
            node = %node_id,
            proposer = %signed.node_id,
            counter = ballot.counter,
            is_trusted,
            is_king,
            "validate ballot"
        );

        if is_king && is_trusted {
            return cb(true);
        }

        // Not the king or not trusted: do not reject (a peer in our slice
        // may legitimately vote for it), but do not speed it up either.
        // Accept after half the round timeout, or immediately once a
        // v-blocking set of peers is asking about this same ballot.
        let delay = Duration::from_millis(fba_timeout_seconds(ballot.counter) * 1000 / 2);
        let shared = SharedCallback::new(cb);
        let on_expiry = shared.clone();
        let timer = OneshotTimer::spawn(delay, move || on_expiry.fire(true));

        let nodes: Vec<NodeId> = {
            let mut registry = self.ballot_timers.lock();
            let waiters = registry.entry(ballot.clone()).or_default();
            waiters.insert(
                *node_id,
                DeferredValidation {
                    _timer: timer,
                    callback: shared,
                },
            );
            waiters.keys().copied().collect()
        };

        if self.fba().is_v_blocking(&nodes) {
            let removed = self.ballot_timers.lock().remove(ballot);
            if let Some(waiters) = removed {
                debug!(
                    counter = ballot.counter,
                    nodes = waiters.len(),
                    "v-blocking set requesting this ballot, accepting now"
                );
                for (_, deferred) in waiters {
                    deferred.callback.fire(true);
                }
            }
        }
    }

    fn compare_values(
        &self,
        slot_index: SlotIndex,
        ballot_counter: u32,
        v1: &Value,
        v2: &Value,
    ) -> Ordering {
        let (b1, b2) = match (SignedBallotValue::decode(v1), SignedBallotValue::decode(v2)) {
            (Ok(b1), Ok(b2)) => (b1, b2),
            _ => {
                // Values are validated before they are compared; reaching
                // this is an engine contract violation.
                error!(slot = slot_index, "compare_values on malformed value");
                debug_assert!(false, "compare_values called with malformed values");
                return Ordering::Equal;
            }
        };
        debug_assert!(b1.verify() && b2.verify());

        compare_signed_values(slot_index, ballot_counter, &b1, &b2)
    }

    /// The engine heard from a quorum: arm the bump timer so a round that
    /// stalls escalates its counter.
    fn ballot_did_hear_from_quorum(&self, slot_index: SlotIndex, ballot: &FbaBallot) {
        if !self.fully_synced() {
            return;
        }
        let lcl_seq = self.last_closed_ledger.read().ledger_seq;
        assert_eq!(
            slot_index,
            lcl_seq + 1,
            "quorum heard for a slot we are not on"
        );

        let delay = Duration::from_secs(fba_timeout_seconds(ballot.counter));
        let weak = self.weak_self.clone();
        let timer = OneshotTimer::spawn(delay, move || {
            if let Some(herder) = weak.upgrade() {
                herder.expire_ballot(slot_index);
            }
        });
        // Replacing the handle cancels any previously armed bump timer.
        *self.bump_timer.lock() = Some(timer);
    }

    /// Consensus reached: commit, rotate, and garbage-collect.
    fn value_externalized(&self, slot_index: SlotIndex, value: &Value) {
        self.bump_timer.lock().take();

        let signed = match SignedBallotValue::decode(value) {
            Ok(signed) => signed,
            Err(err) => {
                // Everything the engine externalizes was validated first,
                // so this should not be reachable.
                error!(slot = slot_index, %err, "externalized value malformed");
                return;
            }
        };

        let Some(tx_set) = self.fetch_tx_set(signed.value.tx_set_hash, false) else {
            // Validation fetches dependencies before acceptance, so the
            // set must be resident.
            error!(
                slot = slot_index,
                set = %signed.value.tx_set_hash.short_hex(),
                "externalized tx set not found"
            );
            return;
        };

        info!(
            slot = slot_index,
            set = %signed.value.tx_set_hash.short_hex(),
            txs = tx_set.len(),
            "value externalized"
        );

        // Retire the active resolver: in-flight fetches for the closed
        // slot die here instead of racing late messages for the next one.
        let current = self.current_tx_set_fetcher.load(AtomicOrdering::SeqCst);
        self.tx_set_resolvers[current].stop_fetching_all();
        let next = current ^ 1;
        self.current_tx_set_fetcher.store(next, AtomicOrdering::SeqCst);
        self.tx_set_resolvers[next].clear();

        let stale_waiters: usize = {
            let mut waiters = self.tx_set_waiters.lock();
            let n = waiters.values().map(Vec::len).sum();
            waiters.clear();
            n
        };
        if stale_waiters > 0 {
            debug!(stale_waiters, "dropped tx set continuations for closed slot");
        }

        // May start a sync if we discover we are behind.
        self.ledger.externalize_value(&tx_set);

        {
            let mut pool = self.tx_pool.lock();
            for tx in tx_set.transactions() {
                pool.remove(&tx.full_hash());
            }
        }

        // Whatever sat through every generation without being included
        // gets one more flood before rotation drops it.
        let leftovers: Vec<Arc<Transaction>> = self.tx_pool.lock().oldest_bucket().to_vec();
        for tx in leftovers {
            self.overlay.broadcast(Message::Transaction(tx));
        }

        let now = Instant::now();
        let expired: Vec<NodeId> = {
            let mut access = self.node_last_access.lock();
            let expired: Vec<NodeId> = access
                .iter()
                .filter(|(_, last)| {
                    now.duration_since(**last) > Duration::from_secs(NODE_EXPIRATION_SECONDS)
                })
                .map(|(node, _)| *node)
                .collect();
            for node in &expired {
                access.remove(node);
            }
            expired
        };
        for node in expired {
            self.fba().purge_node(&node);
        }

        if slot_index > LEDGER_VALIDITY_BRACKET {
            self.fba().purge_slots(slot_index - LEDGER_VALIDITY_BRACKET);
        }

        self.tx_pool.lock().rotate();
    }

    fn retrieve_quorum_set(
        &self,
        node_id: &NodeId,
        quorum_set_hash: &Hash256,
        cb: QuorumSetCallback,
    ) {
        debug!(node = %node_id, qset = %quorum_set_hash.short_hex(), "retrieve quorum set");
        // Peers and node ids are unrelated, so the request goes to the
        // whole overlay rather than a specific peer.
        match self.qset_resolver.fetch(*quorum_set_hash, true) {
            Some(quorum_set) => cb(quorum_set),
            None => {
                self.qset_waiters
                    .lock()
                    .entry(*quorum_set_hash)
                    .or_default()
                    .push(cb);
            }
        }
    }

    fn emit_envelope(&self, envelope: &FbaEnvelope) {
        // No emissions until we are fully synced.
        let waiting = *self.ledgers_to_wait.lock();
        debug!(
            slot = envelope.statement.slot_index,
            ledgers_to_wait = waiting,
            "emit envelope"
        );
        if waiting > 0 {
            return;
        }
        self.overlay.broadcast(Message::Envelope(envelope.clone()));
    }

    fn node_touched(&self, node_id: &NodeId) {
        // Recording access times lets externalization evict nodes that
        // have gone quiet.
        self.node_last_access.lock().insert(*node_id, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fba_timeout_is_exponential_then_capped() {
        assert_eq!(fba_timeout_seconds(0), 1);
        assert_eq!(fba_timeout_seconds(1), 2);
        assert_eq!(fba_timeout_seconds(7), 128);
        assert_eq!(fba_timeout_seconds(8), MAX_FBA_TIMEOUT_SECONDS);
        assert_eq!(fba_timeout_seconds(63), MAX_FBA_TIMEOUT_SECONDS);
        assert_eq!(fba_timeout_seconds(u32::MAX), MAX_FBA_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_counter_bound_accepts_plausible_counters() {
        let now = 1_000_000;
        // Fresh trigger: low counters pass.
        assert!(counter_within_growth_bound(0, now, now));
        assert!(counter_within_growth_bound(3, now, now));
        // After enough elapsed time, higher counters pass too.
        assert!(counter_within_growth_bound(8, now, now - 600));
    }

    #[test]
    fn test_counter_bound_rejects_exhaustion() {
        let now = 1_000_000;
        // A huge counter right after our trigger cannot be genuine.
        assert!(!counter_within_growth_bound(10_000, now, now));
        assert!(!counter_within_growth_bound(10, now, now));
    }

    #[test]
    fn test_counter_bound_terminates_fast_on_huge_counters() {
        // The loop must stop once the sum passes the horizon rather than
        // iterating the full counter.
        let now = 1_000_000;
        let start = std::time::Instant::now();
        assert!(!counter_within_growth_bound(u32::MAX, now, now));
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
