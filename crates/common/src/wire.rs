//! Canonical wire codec.
//!
//! Every structure that is hashed, signed, or put on the wire encodes
//! through this module. The format is deterministic: fixed-width big-endian
//! integers, length-prefixed opaque byte strings, and count-prefixed
//! sequences. Two equal values always produce identical bytes, so content
//! hashes and signatures are stable across nodes.
//!
//! Decoding is strict. Length prefixes are capped, truncated input is an
//! error, and [`from_wire_bytes`] rejects trailing bytes so a foreign blob
//! cannot smuggle extra data past a signature check.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum length of a single opaque byte string.
pub const MAX_OPAQUE_LEN: u32 = 1 << 20;

/// Maximum number of elements in an encoded sequence.
pub const MAX_SEQ_LEN: u32 = 1 << 16;

/// Errors produced while decoding canonical bytes.
#[derive(Debug, Error)]
pub enum WireError {
    /// The input ended before the structure was complete.
    #[error("truncated input")]
    Truncated,

    /// A length or count prefix exceeded its cap.
    #[error("field length {len} exceeds maximum {max}")]
    Oversized { len: u32, max: u32 },

    /// A decoded value was structurally invalid.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// The top-level decode left bytes unconsumed.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// An underlying I/O failure other than truncation.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// A type with a canonical byte encoding.
pub trait WireEncode {
    /// Encode to the given writer. Writing to an in-memory buffer is
    /// infallible, so callers encoding to `Vec<u8>` may unwrap.
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

/// A type decodable from its canonical byte encoding.
pub trait WireDecode: Sized {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError>;
}

/// Encode a value to a fresh byte vector.
pub fn to_wire_bytes<T: WireEncode>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value
        .wire_encode(&mut buf)
        .expect("encoding to Vec<u8> cannot fail");
    buf
}

/// Decode a value from a byte slice, requiring the slice be fully consumed.
pub fn from_wire_bytes<T: WireDecode>(bytes: &[u8]) -> Result<T, WireError> {
    let mut cursor = io::Cursor::new(bytes);
    let value = T::wire_decode(&mut cursor)?;
    let remaining = bytes.len() - cursor.position() as usize;
    if remaining > 0 {
        return Err(WireError::TrailingBytes(remaining));
    }
    Ok(value)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), WireError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(e)
        }
    })
}

impl WireEncode for u32 {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_be_bytes())
    }
}

impl WireDecode for u32 {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut buf = [0u8; 4];
        read_exact_or_truncated(reader, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl WireEncode for u64 {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_be_bytes())
    }
}

impl WireDecode for u64 {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut buf = [0u8; 8];
        read_exact_or_truncated(reader, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
}

impl WireEncode for [u8; 32] {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self)
    }
}

impl WireDecode for [u8; 32] {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut buf = [0u8; 32];
        read_exact_or_truncated(reader, &mut buf)?;
        Ok(buf)
    }
}

/// Opaque byte strings carry a u32 length prefix, capped at [`MAX_OPAQUE_LEN`].
impl WireEncode for Vec<u8> {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        debug_assert!(self.len() <= MAX_OPAQUE_LEN as usize);
        (self.len() as u32).wire_encode(writer)?;
        writer.write_all(self)
    }
}

impl WireDecode for Vec<u8> {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let len = u32::wire_decode(reader)?;
        if len > MAX_OPAQUE_LEN {
            return Err(WireError::Oversized {
                len,
                max: MAX_OPAQUE_LEN,
            });
        }
        let mut buf = vec![0u8; len as usize];
        read_exact_or_truncated(reader, &mut buf)?;
        Ok(buf)
    }
}

/// Encode a sequence with a u32 count prefix, capped at [`MAX_SEQ_LEN`].
pub fn encode_seq<T: WireEncode, W: Write>(items: &[T], writer: &mut W) -> io::Result<()> {
    debug_assert!(items.len() <= MAX_SEQ_LEN as usize);
    (items.len() as u32).wire_encode(writer)?;
    for item in items {
        item.wire_encode(writer)?;
    }
    Ok(())
}

/// Decode a sequence with a u32 count prefix, capped at [`MAX_SEQ_LEN`].
pub fn decode_seq<T: WireDecode, R: Read>(reader: &mut R) -> Result<Vec<T>, WireError> {
    let count = u32::wire_decode(reader)?;
    if count > MAX_SEQ_LEN {
        return Err(WireError::Oversized {
            len: count,
            max: MAX_SEQ_LEN,
        });
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(T::wire_decode(reader)?);
    }
    Ok(items)
}

impl WireEncode for crate::types::Hash256 {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.0.wire_encode(writer)
    }
}

impl WireDecode for crate::types::Hash256 {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self(<[u8; 32]>::wire_decode(reader)?))
    }
}

impl WireEncode for crate::types::NodeId {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.0.wire_encode(writer)
    }
}

impl WireDecode for crate::types::NodeId {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self(<[u8; 32]>::wire_decode(reader)?))
    }
}

impl WireEncode for crate::types::AccountId {
    fn wire_encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.0.wire_encode(writer)
    }
}

impl WireDecode for crate::types::AccountId {
    fn wire_decode<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        Ok(Self(<[u8; 32]>::wire_decode(reader)?))
    }
}
