//! Transaction set frame.
//!
//! The content hash is computed over the transactions in full-hash order,
//! so any permutation of the same transactions produces the same set hash.
//! Apply order is a separate, deliberately unpredictable permutation: it
//! XORs each transaction hash with the set hash, so nobody can position a
//! transaction before the set contents are fixed.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::debug;

use kraal_common::wire::{decode_seq, encode_seq};
use kraal_common::{to_wire_bytes, AccountId, Hash256, WireDecode, WireEncode, WireError};
use kraal_crypto::sha256_multi;

use crate::gateways::LedgerGateway;
use crate::tx::Transaction;

/// An ordered batch of transactions proposed as the content of a slot.
#[derive(Clone, Debug)]
pub struct TxSet {
    previous_ledger_hash: Hash256,
    /// Sorted by full transaction hash.
    transactions: Vec<Arc<Transaction>>,
    content_hash: Hash256,
}

impl TxSet {
    /// Build a set from any ordering of transactions; they are sorted into
    /// full-hash order and the content hash fixed here.
    pub fn new(previous_ledger_hash: Hash256, mut transactions: Vec<Arc<Transaction>>) -> Self {
        transactions.sort_by_key(|tx| tx.full_hash());
        let chunks: Vec<Vec<u8>> = transactions.iter().map(|tx| to_wire_bytes(&**tx)).collect();
        let refs: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();
        let content_hash = sha256_multi(&refs);
        Self {
            previous_ledger_hash,
            transactions,
            content_hash,
        }
    }

    pub fn content_hash(&self) -> Hash256 {
        self.content_hash
    }

    pub fn previous_ledger_hash(&self) -> Hash256 {
        self.previous_ledger_hash
    }

    pub fn transactions(&self) -> &[Arc<Transaction>] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Validate the set against the current ledger state.
    ///
    /// Checks, in order: the set chains from the last closed ledger; full
    /// hashes are strictly increasing (sorted, no duplicates); every source
    /// account can pay the fee for all of its transactions in the set; and
    /// every transaction passes the ledger's validity check.
    pub fn check_valid(&self, ledger: &dyn LedgerGateway) -> bool {
        let lcl = ledger.last_closed_ledger();
        if lcl.hash != self.previous_ledger_hash {
            debug!(
                set = %self.content_hash.short_hex(),
                expected = %lcl.hash.short_hex(),
                got = %self.previous_ledger_hash.short_hex(),
                "tx set chains from wrong ledger"
            );
            return false;
        }

        let mut last_hash = None;
        let mut account_txs: HashMap<AccountId, u64> = HashMap::new();
        for tx in &self.transactions {
            if let Some(last) = last_hash {
                if tx.full_hash() <= last {
                    return false;
                }
            }
            last_hash = Some(tx.full_hash());
            *account_txs.entry(tx.source_account()).or_insert(0) += 1;
        }

        let tx_fee = ledger.tx_fee();
        for (account, count) in &account_txs {
            if ledger.account_balance(account) < *count as i64 * tx_fee {
                debug!(
                    set = %self.content_hash.short_hex(),
                    account = %account.short_hex(),
                    count,
                    "source account cannot cover fees for the set"
                );
                return false;
            }
        }

        for tx in &self.transactions {
            if !ledger.check_tx_valid(tx) {
                return false;
            }
        }

        true
    }

    /// The order in which the ledger should apply the transactions.
    ///
    /// Transactions are grouped into levels by per-account sequence
    /// position (an account's second transaction can only apply after its
    /// first), then each level is sorted by `tx_hash XOR set_hash`.
    pub fn apply_order(&self) -> Vec<Arc<Transaction>> {
        let mut by_seq = self.transactions.clone();
        by_seq.sort_by_key(|tx| tx.seq_num());

        let mut levels: Vec<Vec<Arc<Transaction>>> = Vec::new();
        let mut account_level: HashMap<AccountId, usize> = HashMap::new();
        for tx in by_seq {
            let level = account_level.entry(tx.source_account()).or_insert(0);
            if *level >= levels.len() {
                levels.resize_with(*level + 1, Vec::new);
            }
            levels[*level].push(tx);
            *level += 1;
        }

        let set_hash = self.content_hash;
        let mut out = Vec::with_capacity(self.transactions.len());
        for mut level in levels {
            level.sort_by_key(|tx| xor_hash(&tx.full_hash(), &set_hash));
            out.extend(level);
        }
        out
    }
}

fn xor_hash(a: &Hash256, b: &Hash256) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.0[i] ^ b.0[i];
    }
    out
}

impl WireEncode for TxSet {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.previous_ledger_hash.wire_encode(writer)?;
        let txs: Vec<Transaction> = self.transactions.iter().map(|t| (**t).clone()).collect();
        encode_seq(&txs, writer)
    }
}

impl WireDecode for TxSet {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let previous_ledger_hash = Hash256::wire_decode(reader)?;
        let txs: Vec<Transaction> = decode_seq(reader)?;
        Ok(Self::new(
            previous_ledger_hash,
            txs.into_iter().map(Arc::new).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kraal_common::from_wire_bytes;

    fn account(n: u8) -> AccountId {
        AccountId::from_bytes([n; 32])
    }

    fn tx(src: u8, seq: u64, body: u8) -> Arc<Transaction> {
        Arc::new(Transaction::new(account(src), seq, 10, vec![body]))
    }

    struct StubLedger {
        hash: Hash256,
        balance: i64,
        fee: i64,
    }

    impl LedgerGateway for StubLedger {
        fn last_closed_ledger(&self) -> crate::gateways::LedgerHeader {
            crate::gateways::LedgerHeader {
                ledger_seq: 1,
                hash: self.hash,
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
            true
        }
        fn externalize_value(&self, _tx_set: &TxSet) {}
    }

    #[test]
    fn test_content_hash_order_independent() {
        let prev = Hash256::hash(b"prev");
        let (a, b, c) = (tx(1, 1, 1), tx(2, 1, 2), tx(3, 1, 3));
        let s1 = TxSet::new(prev, vec![a.clone(), b.clone(), c.clone()]);
        let s2 = TxSet::new(prev, vec![c, a, b]);
        assert_eq!(s1.content_hash(), s2.content_hash());
    }

    #[test]
    fn test_content_hash_covers_contents() {
        let prev = Hash256::hash(b"prev");
        let s1 = TxSet::new(prev, vec![tx(1, 1, 1)]);
        let s2 = TxSet::new(prev, vec![tx(1, 1, 2)]);
        assert_ne!(s1.content_hash(), s2.content_hash());
    }

    #[test]
    fn test_check_valid_rejects_wrong_previous_ledger() {
        let ledger = StubLedger {
            hash: Hash256::hash(b"lcl"),
            balance: 1000,
            fee: 10,
        };
        let good = TxSet::new(Hash256::hash(b"lcl"), vec![tx(1, 1, 1)]);
        let bad = TxSet::new(Hash256::hash(b"other"), vec![tx(1, 1, 1)]);
        assert!(good.check_valid(&ledger));
        assert!(!bad.check_valid(&ledger));
    }

    #[test]
    fn test_check_valid_enforces_fee_capacity_per_account() {
        // Two txs from the same account need 2x the fee in balance.
        let ledger = StubLedger {
            hash: Hash256::hash(b"lcl"),
            balance: 15,
            fee: 10,
        };
        let set = TxSet::new(Hash256::hash(b"lcl"), vec![tx(1, 1, 1), tx(1, 2, 2)]);
        assert!(!set.check_valid(&ledger));

        let richer = StubLedger {
            hash: Hash256::hash(b"lcl"),
            balance: 20,
            fee: 10,
        };
        assert!(set.check_valid(&richer));
    }

    #[test]
    fn test_apply_order_is_a_permutation() {
        let prev = Hash256::hash(b"prev");
        let txs = vec![tx(1, 1, 1), tx(1, 2, 2), tx(2, 1, 3), tx(3, 1, 4)];
        let set = TxSet::new(prev, txs.clone());
        let order = set.apply_order();
        assert_eq!(order.len(), txs.len());
        for t in &txs {
            assert!(order.iter().any(|o| o.full_hash() == t.full_hash()));
        }
    }

    #[test]
    fn test_apply_order_respects_sequence_levels() {
        let prev = Hash256::hash(b"prev");
        let first = tx(1, 1, 1);
        let second = tx(1, 2, 2);
        let set = TxSet::new(prev, vec![second.clone(), first.clone()]);
        let order = set.apply_order();
        let pos_first = order
            .iter()
            .position(|t| t.full_hash() == first.full_hash())
            .unwrap();
        let pos_second = order
            .iter()
            .position(|t| t.full_hash() == second.full_hash())
            .unwrap();
        assert!(pos_first < pos_second);
    }

    #[test]
    fn test_wire_round_trip_preserves_hash() {
        let prev = Hash256::hash(b"prev");
        let set = TxSet::new(prev, vec![tx(1, 1, 1), tx(2, 1, 2)]);
        let back: TxSet = from_wire_bytes(&to_wire_bytes(&set)).unwrap();
        assert_eq!(back.content_hash(), set.content_hash());
        assert_eq!(back.previous_ledger_hash(), set.previous_ledger_hash());
        assert_eq!(back.len(), set.len());
    }
}
