//! The transaction as the Herder sees it.
//!
//! The Herder does not interpret transaction semantics; it needs a source
//! account for fee-capacity accounting, a sequence number for apply-order
//! grouping, and a stable full hash for identity. Semantic validity is the
//! ledger collaborator's call.

use std::io::{self, Read, Write};

use kraal_common::{to_wire_bytes, AccountId, Hash256, WireDecode, WireEncode, WireError};

/// A transaction pending inclusion in a ledger.
///
/// The full hash is computed over the canonical encoding at construction
/// and cached; pool membership and tx-set ordering key off it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    source_account: AccountId,
    seq_num: u64,
    max_fee: u32,
    body: Vec<u8>,
    full_hash: Hash256,
}

impl Transaction {
    pub fn new(source_account: AccountId, seq_num: u64, max_fee: u32, body: Vec<u8>) -> Self {
        let mut tx = Self {
            source_account,
            seq_num,
            max_fee,
            body,
            full_hash: Hash256::ZERO,
        };
        tx.full_hash = Hash256::hash(&to_wire_bytes(&tx));
        tx
    }

    pub fn source_account(&self) -> AccountId {
        self.source_account
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn max_fee(&self) -> u32 {
        self.max_fee
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Hash of the whole canonical transaction. Two transactions with the
    /// same contents have the same hash.
    pub fn full_hash(&self) -> Hash256 {
        self.full_hash
    }
}

impl WireEncode for Transaction {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.source_account.wire_encode(writer)?;
        self.seq_num.wire_encode(writer)?;
        self.max_fee.wire_encode(writer)?;
        self.body.wire_encode(writer)
    }
}

impl WireDecode for Transaction {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let source_account = AccountId::wire_decode(reader)?;
        let seq_num = u64::wire_decode(reader)?;
        let max_fee = u32::wire_decode(reader)?;
        let body = Vec::<u8>::wire_decode(reader)?;
        Ok(Self::new(source_account, seq_num, max_fee, body))
    }
}
