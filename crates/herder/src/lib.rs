//! Consensus participation core for the kraal node.
//!
//! The Herder sits between the federated Byzantine agreement engine and the
//! rest of the node. Per ledger slot it:
//!
//! - proposes a candidate value (a transaction set plus close time and fee)
//! - validates and orders candidate values and ballots from peers under
//!   Byzantine-robust rules
//! - drives the slot forward on timeouts
//! - resolves the dependencies a value refers to (transaction sets, quorum
//!   sets) by asynchronous network fetch
//! - commits the externalized value to the ledger layer and garbage-collects
//!   stale state
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |      Herder      |
//! |------------------|
//! | - tx_pool        |  <-- pending transactions, generational buckets
//! | - tx_set_fetchers|  <-- double-buffered dependency resolvers
//! | - qset_fetcher   |
//! | - ballot timers  |  <-- deferred-accept registry
//! +------------------+
//!      |         |
//!      v         v
//! +---------+ +----------+     +---------+
//! | engine  | | overlay  | <-> | ledger  |
//! +---------+ +----------+     +---------+
//! ```
//!
//! The engine, overlay, and ledger are collaborators reached through the
//! [`LedgerGateway`] and [`OverlayGateway`] traits and the `kraal-fba`
//! seam; the Herder owns no network sockets and applies no ledgers itself.

mod ballot;
mod error;
mod fetcher;
mod gateways;
mod herder;
mod state;
mod timers;
mod tx;
mod tx_pool;
mod tx_set;

pub use ballot::{compare_signed_values, rank_node, BallotValue, SignedBallotValue};
pub use error::HerderError;
pub use fetcher::ItemResolver;
pub use gateways::{LedgerGateway, LedgerHeader, Message, OverlayGateway};
pub use herder::{
    Herder, HerderConfig, EXP_LEDGER_TIMESPAN_SECONDS, LEDGERS_TO_WAIT_TO_PARTICIPATE,
    LEDGER_VALIDITY_BRACKET, MAX_FBA_TIMEOUT_SECONDS, MAX_TIME_SLIP_SECONDS,
    NODE_EXPIRATION_SECONDS,
};
pub use state::HerderState;
pub use tx::Transaction;
pub use tx_pool::{TxPool, PENDING_TX_GENERATIONS};
pub use tx_set::TxSet;

/// Result type for Herder operations.
pub type Result<T> = std::result::Result<T, HerderError>;
