//! Shared primitives for the kraal node.
//!
//! This crate holds the types every other crate speaks in: the 32-byte
//! [`Hash256`] digest, the identity newtypes ([`NodeId`], [`AccountId`],
//! [`PeerId`]), wall-clock helpers, and the canonical wire codec used for
//! every hashed or signed structure.

pub mod time;
pub mod types;
pub mod wire;

pub use types::{AccountId, Hash256, NodeId, PeerId};
pub use wire::{from_wire_bytes, to_wire_bytes, WireDecode, WireEncode, WireError};
