//! Ballot value codec and value ordering.
//!
//! The engine votes on opaque bytes; those bytes are the canonical
//! encoding of a [`SignedBallotValue`]. The signature covers only the
//! inner [`BallotValue`]'s canonical bytes, so the same value signed by
//! two nodes differs only in signer and signature.
//!
//! Value ordering is by [`rank_node`]: SHA-256 over slot index, ballot
//! counter, and signer id. Because the counter is part of the digest, a
//! fresh king is elected for every round of every slot, so a single
//! adversary cannot stay preferred across consecutive rounds.

use std::cmp::Ordering;
use std::io::{self, Read, Write};

use kraal_common::{to_wire_bytes, Hash256, NodeId, WireDecode, WireEncode, WireError};
use kraal_crypto::{sha256_multi, PublicKey, SecretKey, Signature};
use kraal_fba::{SlotIndex, Value};

/// The herder's canonical consensus payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BallotValue {
    /// Content hash of the proposed transaction set.
    pub tx_set_hash: Hash256,
    /// Proposed close time, seconds since epoch.
    pub close_time: u64,
    /// Proposed fee per operation.
    pub base_fee: u32,
}

impl WireEncode for BallotValue {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.tx_set_hash.wire_encode(writer)?;
        self.close_time.wire_encode(writer)?;
        self.base_fee.wire_encode(writer)
    }
}

impl WireDecode for BallotValue {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            tx_set_hash: Hash256::wire_decode(reader)?,
            close_time: u64::wire_decode(reader)?,
            base_fee: u32::wire_decode(reader)?,
        })
    }
}

/// A ballot value plus its signer and signature.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignedBallotValue {
    pub value: BallotValue,
    /// Public key of the signer, also its node identity.
    pub node_id: NodeId,
    /// Signature over the canonical bytes of `value` only.
    pub signature: Signature,
}

impl SignedBallotValue {
    /// Sign a ballot value with the node's validation key.
    pub fn sign(value: BallotValue, secret: &SecretKey) -> Self {
        let signature = secret.sign(&to_wire_bytes(&value));
        Self {
            value,
            node_id: secret.public_key().node_id(),
            signature,
        }
    }

    /// Re-derive the canonical bytes and check the embedded signature.
    pub fn verify(&self) -> bool {
        let Ok(public) = PublicKey::from_bytes(self.node_id.as_bytes()) else {
            return false;
        };
        public
            .verify(&to_wire_bytes(&self.value), &self.signature)
            .is_ok()
    }

    /// Decode from the opaque value carried by the engine.
    ///
    /// A foreign blob that does not parse is a malformed value; callers
    /// treat that as a validation failure.
    pub fn decode(value: &Value) -> Result<Self, WireError> {
        kraal_common::from_wire_bytes(value.as_slice())
    }

    /// Encode into the opaque value carried by the engine.
    pub fn encode(&self) -> Value {
        Value::new(to_wire_bytes(self))
    }
}

impl WireEncode for SignedBallotValue {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.value.wire_encode(writer)?;
        self.node_id.wire_encode(writer)?;
        self.signature.wire_encode(writer)
    }
}

impl WireDecode for SignedBallotValue {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            value: BallotValue::wire_decode(reader)?,
            node_id: NodeId::wire_decode(reader)?,
            signature: Signature::wire_decode(reader)?,
        })
    }
}

/// Rank of a node for one round of one slot.
///
/// The king of a round is the node whose rank is smallest among the local
/// quorum set. This same function drives [`compare_signed_values`], which
/// keeps the king election consistent with the engine's value ordering.
pub fn rank_node(slot_index: SlotIndex, ballot_counter: u32, node_id: &NodeId) -> Hash256 {
    sha256_multi(&[
        &slot_index.to_be_bytes(),
        &ballot_counter.to_be_bytes(),
        node_id.as_bytes(),
    ])
}

/// Deterministic order over already-verified signed values.
///
/// Signer rank orders first so the round king's value sorts ahead of all
/// others; equal ranks fall back to the canonical bytes of the inner
/// value. Strict trichotomy holds: swapping the arguments reverses the
/// result.
pub fn compare_signed_values(
    slot_index: SlotIndex,
    ballot_counter: u32,
    v1: &SignedBallotValue,
    v2: &SignedBallotValue,
) -> Ordering {
    let h1 = rank_node(slot_index, ballot_counter, &v1.node_id);
    let h2 = rank_node(slot_index, ballot_counter, &v2.node_id);
    h1.cmp(&h2)
        .then_with(|| to_wire_bytes(&v1.value).cmp(&to_wire_bytes(&v2.value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value() -> BallotValue {
        BallotValue {
            tx_set_hash: Hash256::hash(b"txset"),
            close_time: 1_700_000_000,
            base_fee: 10,
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let secret = SecretKey::generate();
        let signed = SignedBallotValue::sign(sample_value(), &secret);
        assert!(signed.verify());
        assert_eq!(signed.node_id, secret.public_key().node_id());
    }

    #[test]
    fn test_tampered_value_fails_verification() {
        let secret = SecretKey::generate();
        let mut signed = SignedBallotValue::sign(sample_value(), &secret);
        signed.value.base_fee += 1;
        assert!(!signed.verify());
    }

    #[test]
    fn test_wrong_signer_fails_verification() {
        let secret = SecretKey::generate();
        let mut signed = SignedBallotValue::sign(sample_value(), &secret);
        signed.node_id = SecretKey::generate().public_key().node_id();
        assert!(!signed.verify());
    }

    #[test]
    fn test_encode_decode_is_canonical() {
        let secret = SecretKey::generate();
        let signed = SignedBallotValue::sign(sample_value(), &secret);
        let value = signed.encode();
        let back = SignedBallotValue::decode(&value).unwrap();
        assert_eq!(back, signed);
        assert_eq!(back.encode(), value);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SignedBallotValue::decode(&Value::new(vec![1, 2, 3])).is_err());
        assert!(SignedBallotValue::decode(&Value::new(vec![])).is_err());
    }

    #[test]
    fn test_rank_changes_per_round_and_slot() {
        let node = NodeId::from_bytes([5; 32]);
        let base = rank_node(1, 0, &node);
        assert_ne!(base, rank_node(1, 1, &node));
        assert_ne!(base, rank_node(2, 0, &node));
        assert_eq!(base, rank_node(1, 0, &node));
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let s1 = SignedBallotValue::sign(sample_value(), &SecretKey::generate());
        let s2 = SignedBallotValue::sign(sample_value(), &SecretKey::generate());
        let forward = compare_signed_values(1, 0, &s1, &s2);
        let backward = compare_signed_values(1, 0, &s2, &s1);
        assert_eq!(forward, backward.reverse());
        assert_ne!(forward, Ordering::Equal);
    }

    #[test]
    fn test_compare_equal_values_same_signer() {
        let secret = SecretKey::generate();
        let s1 = SignedBallotValue::sign(sample_value(), &secret);
        let s2 = SignedBallotValue::sign(sample_value(), &secret);
        assert_eq!(compare_signed_values(1, 0, &s1, &s2), Ordering::Equal);
    }

    #[test]
    fn test_compare_same_signer_different_values() {
        // Same rank; ordering falls back to the canonical value bytes.
        let secret = SecretKey::generate();
        let mut low = sample_value();
        low.close_time = 1;
        let mut high = sample_value();
        high.close_time = 2;
        // Equal tx_set_hash prefixes keep the byte comparison on close_time.
        let s_low = SignedBallotValue::sign(low, &secret);
        let s_high = SignedBallotValue::sign(high, &secret);
        assert_eq!(compare_signed_values(1, 0, &s_low, &s_high), Ordering::Less);
        assert_eq!(
            compare_signed_values(1, 0, &s_high, &s_low),
            Ordering::Greater
        );
    }
}
