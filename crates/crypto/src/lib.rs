//! Cryptographic primitives for the kraal node.
//!
//! Ed25519 key management and SHA-256 hashing. Node identities are raw
//! Ed25519 public keys; ballot values are signed with the node's validation
//! key. A node configured with the all-zero seed is a watch-only observer
//! and never signs anything.

mod error;
mod hash;
mod keys;

pub use error::CryptoError;
pub use hash::{sha256, sha256_multi};
pub use keys::{PublicKey, SecretKey, Signature};
