//! SHA-256 hashing helpers.
//!
//! Single-shot and multi-chunk hashing, both returning [`Hash256`]. The
//! multi-chunk form is what the rank function uses to fold a slot index,
//! ballot counter, and node id into one digest without an intermediate
//! allocation.

use kraal_common::Hash256;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of the given data.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256::hash(data)
}

/// Computes the SHA-256 hash of several chunks, as if concatenated.
pub fn sha256_multi(chunks: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash256(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_matches_concatenation() {
        let whole = sha256(b"helloworld");
        let chunked = sha256_multi(&[b"hello", b"world"]);
        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let a = sha256_multi(&[b"ab", b"cdef"]);
        let b = sha256_multi(&[b"abcd", b"ef"]);
        assert_eq!(a, b);
    }
}
