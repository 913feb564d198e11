//! Protocol data types.
//!
//! The engine treats [`Value`] as opaque bytes; only the herder knows they
//! decode to a signed ballot value. Everything here carries the canonical
//! wire encoding so envelopes and quorum sets can be hashed and flooded.

use std::fmt;
use std::io::{self, Read, Write};

use kraal_common::wire::{decode_seq, encode_seq};
use kraal_common::{to_wire_bytes, Hash256, NodeId, WireDecode, WireEncode, WireError};
use kraal_crypto::Signature;

/// An opaque consensus value.
///
/// The engine orders and votes on these without interpreting them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Value(pub Vec<u8>);

impl Value {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", Hash256::hash(&self.0).short_hex())
    }
}

impl WireEncode for Value {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.0.wire_encode(writer)
    }
}

impl WireDecode for Value {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self(Vec::<u8>::wire_decode(reader)?))
    }
}

/// A ballot: a round counter paired with the value being voted on.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FbaBallot {
    /// Ballot counter, bumped on each timeout round.
    pub counter: u32,
    /// The opaque value under vote.
    pub value: Value,
}

impl WireEncode for FbaBallot {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.counter.wire_encode(writer)?;
        self.value.wire_encode(writer)
    }
}

impl WireDecode for FbaBallot {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            counter: u32::wire_decode(reader)?,
            value: Value::wire_decode(reader)?,
        })
    }
}

/// The statement a node makes about a slot.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FbaStatement {
    /// The node making the statement.
    pub node_id: NodeId,
    /// The slot the statement is about.
    pub slot_index: u64,
    /// The ballot being pledged.
    pub ballot: FbaBallot,
    /// Hash of the sender's quorum set, fetched on demand.
    pub quorum_set_hash: Hash256,
}

impl WireEncode for FbaStatement {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.node_id.wire_encode(writer)?;
        self.slot_index.wire_encode(writer)?;
        self.ballot.wire_encode(writer)?;
        self.quorum_set_hash.wire_encode(writer)
    }
}

impl WireDecode for FbaStatement {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            node_id: NodeId::wire_decode(reader)?,
            slot_index: u64::wire_decode(reader)?,
            ballot: FbaBallot::wire_decode(reader)?,
            quorum_set_hash: Hash256::wire_decode(reader)?,
        })
    }
}

/// A signed statement as flooded on the overlay.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FbaEnvelope {
    pub statement: FbaStatement,
    pub signature: Signature,
}

impl WireEncode for FbaEnvelope {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.statement.wire_encode(writer)?;
        self.signature.wire_encode(writer)
    }
}

impl WireDecode for FbaEnvelope {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            statement: FbaStatement::wire_decode(reader)?,
            signature: Signature::wire_decode(reader)?,
        })
    }
}

/// The local trust configuration: a threshold over a flat validator list.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QuorumSet {
    /// How many members must agree.
    pub threshold: u32,
    /// The trusted validator ids.
    pub validators: Vec<NodeId>,
}

impl QuorumSet {
    /// Content hash of the canonical encoding, used to reference quorum
    /// sets in statements and fetch them from peers.
    pub fn hash(&self) -> Hash256 {
        Hash256::hash(&to_wire_bytes(self))
    }
}

impl WireEncode for QuorumSet {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.threshold.wire_encode(writer)?;
        encode_seq(&self.validators, writer)
    }
}

impl WireDecode for QuorumSet {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self {
            threshold: u32::wire_decode(reader)?,
            validators: decode_seq(reader)?,
        })
    }
}
