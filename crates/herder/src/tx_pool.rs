//! Pending transaction pool.
//!
//! Received-but-uncommitted transactions live in generational buckets:
//! new arrivals land in bucket 0 and age one bucket per externalized
//! ledger. A transaction that survives every generation without being
//! included is rebroadcast once and then dropped, which gives the pool a
//! TTL without tracking timestamps. A transaction appears in at most one
//! bucket; identity is the full transaction hash.

use std::sync::Arc;

use kraal_common::Hash256;

use crate::gateways::LedgerGateway;
use crate::tx::Transaction;

/// Number of generational buckets.
pub const PENDING_TX_GENERATIONS: usize = 4;

/// Generational pool of pending transactions.
pub struct TxPool {
    buckets: Vec<Vec<Arc<Transaction>>>,
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TxPool {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); PENDING_TX_GENERATIONS],
        }
    }

    /// Admit a transaction into bucket 0.
    ///
    /// Rejects duplicates (by full hash), transactions the ledger deems
    /// invalid, and transactions whose source account cannot cover the fee
    /// for this and all of its other pending transactions.
    pub fn recv(&mut self, tx: Arc<Transaction>, ledger: &dyn LedgerGateway) -> bool {
        let tx_id = tx.full_hash();

        let mut num_others: i64 = 0;
        for bucket in &self.buckets {
            for old in bucket {
                if old.full_hash() == tx_id {
                    return false;
                }
                if old.source_account() == tx.source_account() {
                    num_others += 1;
                }
            }
        }

        if !ledger.check_tx_valid(&tx) {
            return false;
        }

        // Minimum balance is deliberately not reserved here; the account
        // only has to cover the fees of everything it has pending.
        if ledger.account_balance(&tx.source_account()) < (num_others + 1) * ledger.tx_fee() {
            return false;
        }

        self.buckets[0].push(tx);
        true
    }

    /// Remove the transaction with this full hash, wherever it is.
    ///
    /// At most one entry can match.
    pub fn remove(&mut self, tx_id: &Hash256) {
        for bucket in &mut self.buckets {
            if let Some(pos) = bucket.iter().position(|t| t.full_hash() == *tx_id) {
                bucket.remove(pos);
                return;
            }
        }
    }

    /// Age every generation by one on externalization.
    ///
    /// The oldest bucket's content is discarded (the caller rebroadcasts it
    /// first) and bucket 0 is left empty for the next slot's arrivals.
    pub fn rotate(&mut self) {
        for n in (1..self.buckets.len()).rev() {
            let younger = std::mem::take(&mut self.buckets[n - 1]);
            self.buckets[n] = younger;
        }
    }

    /// The bucket about to fall off on the next rotation.
    pub fn oldest_bucket(&self) -> &[Arc<Transaction>] {
        self.buckets.last().map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// All pending transactions across every generation.
    pub fn snapshot(&self) -> Vec<Arc<Transaction>> {
        self.buckets.iter().flatten().cloned().collect()
    }

    pub fn contains(&self, tx_id: &Hash256) -> bool {
        self.buckets
            .iter()
            .any(|b| b.iter().any(|t| t.full_hash() == *tx_id))
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transactions in one generation, oldest at the highest index.
    pub fn bucket_len(&self, n: usize) -> usize {
        self.buckets.get(n).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::LedgerHeader;
    use kraal_common::AccountId;

    struct StubLedger {
        balance: i64,
        fee: i64,
        valid: bool,
    }

    impl StubLedger {
        fn rich() -> Self {
            Self {
                balance: 1_000_000,
                fee: 10,
                valid: true,
            }
        }
    }

    impl LedgerGateway for StubLedger {
        fn last_closed_ledger(&self) -> LedgerHeader {
            LedgerHeader {
                ledger_seq: 1,
                hash: Hash256::ZERO,
                close_time: 0,
            }
        }
        fn tx_fee(&self) -> i64 {
            self.fee
        }
        fn account_balance(&self, _account: &AccountId) -> i64 {
            self.balance
        }
        fn check_tx_valid(&self, _tx: &Transaction) -> bool {
            self.valid
        }
        fn externalize_value(&self, _tx_set: &crate::tx_set::TxSet) {}
    }

    fn tx(src: u8, seq: u64) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            AccountId::from_bytes([src; 32]),
            seq,
            100,
            vec![src, seq as u8],
        ))
    }

    #[test]
    fn test_recv_then_duplicate() {
        let ledger = StubLedger::rich();
        let mut pool = TxPool::new();
        let t = tx(1, 1);
        assert!(pool.recv(t.clone(), &ledger));
        assert!(!pool.recv(t, &ledger));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_duplicate_found_in_older_bucket() {
        let ledger = StubLedger::rich();
        let mut pool = TxPool::new();
        let t = tx(1, 1);
        assert!(pool.recv(t.clone(), &ledger));
        pool.rotate();
        assert_eq!(pool.bucket_len(1), 1);
        assert!(!pool.recv(t, &ledger));
    }

    #[test]
    fn test_invalid_tx_rejected() {
        let ledger = StubLedger {
            valid: false,
            ..StubLedger::rich()
        };
        let mut pool = TxPool::new();
        assert!(!pool.recv(tx(1, 1), &ledger));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_fee_headroom_counts_pending_from_same_source() {
        // Balance covers exactly two fees; the third tx from the same
        // account must be rejected.
        let ledger = StubLedger {
            balance: 20,
            fee: 10,
            valid: true,
        };
        let mut pool = TxPool::new();
        assert!(pool.recv(tx(1, 1), &ledger));
        assert!(pool.recv(tx(1, 2), &ledger));
        assert!(!pool.recv(tx(1, 3), &ledger));
        // A different account is unaffected.
        assert!(pool.recv(tx(2, 1), &ledger));
    }

    #[test]
    fn test_remove_present_and_absent() {
        let ledger = StubLedger::rich();
        let mut pool = TxPool::new();
        let t = tx(1, 1);
        pool.recv(t.clone(), &ledger);

        pool.remove(&Hash256::hash(b"not in pool"));
        assert_eq!(pool.len(), 1);

        pool.remove(&t.full_hash());
        assert!(pool.is_empty());
        // Removing again is a no-op.
        pool.remove(&t.full_hash());
    }

    #[test]
    fn test_rotation_ages_generations() {
        let ledger = StubLedger::rich();
        let mut pool = TxPool::new();
        let t = tx(1, 1);
        pool.recv(t.clone(), &ledger);

        for expected_bucket in 1..PENDING_TX_GENERATIONS {
            pool.rotate();
            assert_eq!(pool.bucket_len(expected_bucket), 1);
            assert_eq!(pool.len(), 1);
        }

        // One more rotation drops it off the end.
        assert_eq!(pool.oldest_bucket().len(), 1);
        pool.rotate();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_no_tx_in_more_than_one_bucket() {
        let ledger = StubLedger::rich();
        let mut pool = TxPool::new();
        let t = tx(1, 1);
        pool.recv(t.clone(), &ledger);
        pool.rotate();
        pool.recv(tx(2, 1), &ledger);

        let matches: usize = (0..PENDING_TX_GENERATIONS)
            .map(|n| {
                pool.buckets[n]
                    .iter()
                    .filter(|x| x.full_hash() == t.full_hash())
                    .count()
            })
            .sum();
        assert_eq!(matches, 1);
    }
}
