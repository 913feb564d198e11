//! Collaborator seams: the ledger and the overlay.
//!
//! The herder never applies ledgers or talks to sockets. It reads ledger
//! state and hands externalized sets through [`LedgerGateway`], and floods
//! typed [`Message`]s through [`OverlayGateway`]. The overlay calls back
//! into the herder's `recv_*` methods with whatever arrives from peers.

use std::sync::Arc;

use kraal_common::{AccountId, Hash256};
use kraal_fba::{FbaEnvelope, QuorumSet};

use crate::tx::Transaction;
use crate::tx_set::TxSet;

/// Snapshot of the last closed ledger header. The herder only reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerHeader {
    /// Sequence number of the closed ledger.
    pub ledger_seq: u64,
    /// Hash of the closed ledger.
    pub hash: Hash256,
    /// Close time agreed for the ledger, seconds since epoch.
    pub close_time: u64,
}

/// The ledger layer as the herder sees it.
pub trait LedgerGateway: Send + Sync {
    /// Header of the last closed ledger.
    fn last_closed_ledger(&self) -> LedgerHeader;

    /// Current fee charged per transaction.
    fn tx_fee(&self) -> i64;

    /// Balance of an account in the current ledger state.
    fn account_balance(&self, account: &AccountId) -> i64;

    /// Semantic validity of a transaction against current state.
    fn check_tx_valid(&self, tx: &Transaction) -> bool;

    /// Commit an externalized transaction set. May start a sync if the
    /// node discovers it is behind.
    fn externalize_value(&self, tx_set: &TxSet);
}

/// A typed message flooded on the overlay.
#[derive(Clone, Debug)]
pub enum Message {
    /// A consensus protocol envelope.
    Envelope(FbaEnvelope),
    /// A pending transaction.
    Transaction(Arc<Transaction>),
    /// A transaction set, answering a `GetTxSet`.
    TxSet(Arc<TxSet>),
    /// A quorum set, answering a `GetQuorumSet`.
    QuorumSet(QuorumSet),
    /// Request for the transaction set with this content hash.
    GetTxSet(Hash256),
    /// Request for the quorum set with this hash.
    GetQuorumSet(Hash256),
    /// The sender does not have the requested transaction set.
    DontHaveTxSet(Hash256),
    /// The sender does not have the requested quorum set.
    DontHaveQuorumSet(Hash256),
}

/// The peer overlay as the herder sees it.
pub trait OverlayGateway: Send + Sync {
    /// Flood a message to connected peers.
    fn broadcast(&self, message: Message);
}
