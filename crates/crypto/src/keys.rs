//! Ed25519 key types.
//!
//! - [`PublicKey`]: a 32-byte verifying key, also the node's identity
//! - [`SecretKey`]: a 32-byte signing seed; the all-zero seed marks a
//!   watch-only node
//! - [`Signature`]: a 64-byte Ed25519 signature
//!
//! # Example
//!
//! ```
//! use kraal_crypto::SecretKey;
//!
//! let secret = SecretKey::generate();
//! let public = secret.public_key();
//! let sig = secret.sign(b"message");
//! assert!(public.verify(b"message", &sig).is_ok());
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use ed25519_dalek::{SigningKey, VerifyingKey};

use kraal_common::{NodeId, WireDecode, WireEncode, WireError};

use crate::error::CryptoError;

/// An Ed25519 public key (verifying key).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Creates a public key from raw 32-byte Ed25519 key material.
    ///
    /// Fails if the bytes are not a valid point on the curve.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(key))
    }

    /// Returns the raw 32-byte key material.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Verifies an Ed25519 signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        use ed25519_dalek::Verifier;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// The node identity corresponding to this key.
    pub fn node_id(&self) -> NodeId {
        NodeId(*self.as_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.as_bytes()[..3]))
    }
}

impl WireEncode for PublicKey {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.as_bytes().wire_encode(writer)
    }
}

impl WireDecode for PublicKey {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let bytes = <[u8; 32]>::wire_decode(reader)?;
        PublicKey::from_bytes(&bytes).map_err(|_| WireError::InvalidValue("public key"))
    }
}

/// An Ed25519 secret key (signing key).
///
/// The all-zero seed is reserved: a node configured with it is watch-only
/// and must never emit signed values. `Debug` never reveals key material.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generates a new random secret key from the OS random number generator.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: SigningKey::generate(&mut csprng),
        }
    }

    /// Creates a secret key from a 32-byte seed. Deterministic.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: SigningKey::from_bytes(seed),
        }
    }

    /// The watch-only sentinel key.
    pub fn zero() -> Self {
        Self::from_seed(&[0u8; 32])
    }

    /// True for the watch-only sentinel.
    pub fn is_zero(&self) -> bool {
        self.inner.as_bytes() == &[0u8; 32]
    }

    /// Signs a message, producing a 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.inner.sign(message).to_bytes())
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.inner.verifying_key())
    }

    /// Returns the raw 32-byte seed. Sensitive; handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self {
            inner: SigningKey::from_bytes(self.inner.as_bytes()),
        }
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

impl WireEncode for Signature {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl WireDecode for Signature {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut buf = [0u8; 64];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                WireError::Truncated
            } else {
                WireError::Io(e)
            }
        })?;
        Ok(Self(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = SecretKey::generate();
        let public = secret.public_key();

        let sig = secret.sign(b"hello");
        assert!(public.verify(b"hello", &sig).is_ok());
        assert!(public.verify(b"other", &sig).is_err());
    }

    #[test]
    fn test_from_seed_is_deterministic() {
        let seed = [7u8; 32];
        let a = SecretKey::from_seed(&seed);
        let b = SecretKey::from_seed(&seed);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"msg"), b.sign(b"msg"));
    }

    #[test]
    fn test_zero_key_sentinel() {
        assert!(SecretKey::zero().is_zero());
        assert!(!SecretKey::generate().is_zero());
    }

    #[test]
    fn test_wrong_key_rejects() {
        let a = SecretKey::generate();
        let b = SecretKey::generate();
        let sig = a.sign(b"payload");
        assert!(b.public_key().verify(b"payload", &sig).is_err());
    }

    #[test]
    fn test_public_key_wire_round_trip() {
        let public = SecretKey::generate().public_key();
        let bytes = kraal_common::to_wire_bytes(&public);
        let back: PublicKey = kraal_common::from_wire_bytes(&bytes).unwrap();
        assert_eq!(back, public);
    }
}
