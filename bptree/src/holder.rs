//! Entry contract for keys and values stored in the tree.
//!
//! A holder knows its encoded length, can write itself to a buffer, and can
//! decode a fresh instance of its own type. Decoding is driven from a blank
//! instance so that trees and serializing stores never need to conjure a
//! value out of nothing.
//!
//! # Encoding
//!
//! - `NullHolder`: zero bytes
//! - `IntHolder`: 4 bytes, big-endian
//! - `LongHolder`: 8 bytes, big-endian
//! - `StringHolder`: `u16` length (big-endian) followed by UTF-8 bytes

#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::hash::Hash;

/// Capability required of any key or value type used with the tree.
pub trait Holder: Ord + Clone + Hash + fmt::Debug + Send + Sync + 'static {
    /// Number of bytes `serialize` will write for this instance.
    fn byte_length(&self) -> usize;

    /// Append the encoded form of this instance to `buf`.
    fn serialize(&self, buf: &mut Vec<u8>);

    /// Decode an instance from the front of `buf`, advancing it.
    ///
    /// Called on a blank instance; `self` carries no information.
    fn deserialize(&self, buf: &mut &[u8]) -> Result<Self, CodecError>;

    /// Encoded size used when sizing nodes to a block.
    ///
    /// Fixed-size holders return their exact length. Variable-size holders
    /// return a representative length.
    fn size_hint(&self) -> usize {
        self.byte_length()
    }
}

/// Errors produced while decoding holders or nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before a complete value was read.
    UnexpectedEof { needed: usize, available: usize },
    /// String bytes were not valid UTF-8.
    InvalidUtf8,
    /// Unknown node kind discriminant.
    InvalidNodeType(u8),
    /// Encoded node kind does not match the sign of its id.
    WrongNodeType { id: i32 },
    /// Page checksum did not match its contents.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Bytes remained after a complete node was decoded.
    TrailingBytes(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { needed, available } => {
                write!(
                    f,
                    "unexpected end of buffer: needed {needed} bytes, {available} available"
                )
            }
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in string holder"),
            Self::InvalidNodeType(kind) => write!(f, "invalid node type: {kind}"),
            Self::WrongNodeType { id } => {
                write!(f, "encoded node kind does not match node id {id}")
            }
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
            Self::TrailingBytes(count) => write!(f, "{count} trailing bytes after node"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Split `len` bytes off the front of `buf`.
pub fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < len {
        return Err(CodecError::UnexpectedEof {
            needed: len,
            available: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Read a fixed-size array off the front of `buf`.
pub fn take_array<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(buf, N)?);
    Ok(out)
}

/// The absent value. Useful as a value type when the tree is used as a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NullHolder;

impl NullHolder {
    /// The single null value.
    pub const NULL: Self = Self;
}

impl fmt::Display for NullHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "null")
    }
}

impl Holder for NullHolder {
    fn byte_length(&self) -> usize {
        0
    }

    fn serialize(&self, _buf: &mut Vec<u8>) {}

    fn deserialize(&self, _buf: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self::NULL)
    }
}

/// A 32-bit signed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IntHolder(pub i32);

impl fmt::Display for IntHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for IntHolder {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl Holder for IntHolder {
    fn byte_length(&self) -> usize {
        4
    }

    fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_be_bytes());
    }

    fn deserialize(&self, buf: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self(i32::from_be_bytes(take_array(buf)?)))
    }
}

/// A 64-bit signed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LongHolder(pub i64);

impl fmt::Display for LongHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LongHolder {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Holder for LongHolder {
    fn byte_length(&self) -> usize {
        8
    }

    fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_be_bytes());
    }

    fn deserialize(&self, buf: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self(i64::from_be_bytes(take_array(buf)?)))
    }
}

/// A UTF-8 string of at most `u16::MAX` bytes.
///
/// Ordering is byte-wise, matching `String`'s `Ord`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StringHolder(String);

impl StringHolder {
    /// Maximum encoded string length in bytes.
    pub const MAX_LENGTH: usize = u16::MAX as usize;

    /// Length assumed for block sizing.
    pub const REPRESENTATIVE_LENGTH: usize = 64;

    /// Create a holder, truncating to `MAX_LENGTH` bytes on a char boundary.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let mut value = value.into();
        if value.len() > Self::MAX_LENGTH {
            let mut cut = Self::MAX_LENGTH;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
        }
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StringHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StringHolder {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Holder for StringHolder {
    fn byte_length(&self) -> usize {
        2 + self.0.len()
    }

    fn serialize(&self, buf: &mut Vec<u8>) {
        // Length is bounded by `new`.
        buf.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        buf.extend_from_slice(self.0.as_bytes());
    }

    fn deserialize(&self, buf: &mut &[u8]) -> Result<Self, CodecError> {
        let len = u16::from_be_bytes(take_array(buf)?) as usize;
        let bytes = take(buf, len)?;
        let value = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Self(value.to_owned()))
    }

    fn size_hint(&self) -> usize {
        2 + Self::REPRESENTATIVE_LENGTH
    }
}
