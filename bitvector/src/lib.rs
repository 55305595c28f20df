//! Grow, query, and serialize bit vectors over interchangeable backing stores.
//!
//! A [BitVector] is an indexable, growable sequence of bits addressed by a non-negative index.
//! Bits start out unset and are set individually; the vector grows to cover whatever index is
//! written. Two backing stores implement the same contract:
//!
//! * [WordBitVector] packs bits into 64-bit [Word]s, either materializing every word up to the
//!   highest one written ([Mode::Dense]) or only the words actually touched ([Mode::Sparse]).
//! * [ByteBitVector] packs bits into a byte buffer that grows to the next power of two.
//!
//! # Length
//!
//! The length of a vector is one past the highest index ever set (not the allocated capacity).
//! Reads at or beyond the length, or at a negative index, return `false`. Only writes fail:
//! setting a negative index returns [Error::NegativeIndex], and an index whose storage cannot be
//! allocated returns [Error::Capacity].
//!
//! # Format
//!
//! A vector of `length` bits serializes to exactly `ceil(length / 8)` bytes. Bit `i` lives in
//! byte `i / 8`, at position `i % 8` counting from the least-significant bit:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-----+
//! | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 |10 |11 |12 |13 |14 |15 | ... |  bit index
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-----+
//! |  byte 0 (bit 0 = LSB, bit 7 = MSB)  |  byte 1 (bit 8 = LSB, ...)  | ... |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-----+
//! ```
//!
//! Words are always decomposed least-significant byte first, so the format does not depend on
//! the byte order of the host. Because a partial final byte cannot be represented, importing
//! bytes sets the length to `8 * bytes.len()`.
//!
//! The same bytes are exchanged as Base64 text with [BitVector::to_base64] (standard alphabet,
//! padded) and [BitVector::import_base64] (also accepts the URL-safe alphabet).
//!
//! For an exact-length encoding, both stores also implement [commonware_codec::Write] and
//! [commonware_codec::Read]: a `u64` varint bit length followed by the `ceil(length / 8)` bytes
//! above.
//!
//! # Example
//!
//! ```rust
//! use commonware_bitvector::{BitVector, ByteBitVector, Mode, WordBitVector};
//!
//! // Set a few bits in a sparse word-backed vector
//! let mut words = WordBitVector::new(Mode::Sparse);
//! words.set(0).unwrap();
//! words.set(9).unwrap();
//! words.set(64).unwrap();
//! assert_eq!(words.len(), 65);
//! assert_eq!(words.to_base64(), "AQIAAAAAAAAB");
//!
//! // Load the same bits into a byte-backed vector
//! let mut bytes = ByteBitVector::new();
//! bytes.import_base64(&words.to_base64()).unwrap();
//! assert!(bytes.get(9));
//! assert!(!bytes.get(10));
//! assert_eq!(bytes.len(), 72);
//! ```
//!
//! # Status
//!
//! `commonware-bitvector` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use base64::{
    alphabet,
    engine::{
        general_purpose::STANDARD as BASE64, DecodePaddingMode, GeneralPurpose,
        GeneralPurposeConfig,
    },
    Engine,
};
use bytes::{Buf, BufMut};
use commonware_codec::{varint::UInt, EncodeSize, Error as CodecError, Read, ReadExt, Write};
use thiserror::Error;
use tracing::{debug, warn};

mod byte;
pub use byte::{ByteBitVector, MIN_CAPACITY};
mod word;
pub use word::{Mode, Word, WordBitVector, WORD_BITS, WORD_BYTES, WORD_SHIFT};

/// Bounds the bit length accepted when decoding a vector (a [commonware_codec::RangeCfg]).
pub type LengthCfg = <usize as Read>::Cfg;

/// Decodes the standard alphabet, with or without padding.
const BASE64_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors that can occur when interacting with a [BitVector].
#[derive(Debug, Error)]
pub enum Error {
    #[error("negative index: {0}")]
    NegativeIndex(i64),
    #[error("index exceeds capacity: {0}")]
    Capacity(i64),
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// A growable sequence of bits.
pub trait BitVector {
    /// Returns one past the highest index ever set, or 0 if no bit was ever set.
    fn len(&self) -> usize;

    /// Returns true if no bit has been set since creation (or since the last reset).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets the bit at `index`, growing the vector to cover it.
    ///
    /// Fails with [Error::NegativeIndex] if `index` is negative, or with [Error::Capacity] if
    /// storage covering `index` cannot be allocated on this host. The vector is left unchanged
    /// on failure.
    fn set(&mut self, index: i64) -> Result<(), Error>;

    /// Returns the bit at `index`.
    ///
    /// Never fails: negative indices and indices at or beyond [BitVector::len] are `false`.
    fn get(&self, index: i64) -> bool;

    /// Serializes the vector into exactly `ceil(len / 8)` bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Replaces the contents of the vector with `bytes`.
    ///
    /// The length becomes `8 * bytes.len()`. Empty input resets the vector.
    fn import_bytes(&mut self, bytes: &[u8]);

    /// Serializes the vector as standard (padded) Base64.
    fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Replaces the contents of the vector with the Base64-encoded bytes in `text`.
    ///
    /// Both the standard and the URL-safe alphabets are accepted, with or without padding.
    /// Empty input resets the vector. If `text` is not valid Base64, the vector is left
    /// unchanged.
    fn import_base64(&mut self, text: &str) -> Result<(), Error> {
        if text.is_empty() {
            self.import_bytes(&[]);
            return Ok(());
        }
        let normalized = text.replace('-', "+").replace('_', "/");
        let bytes = BASE64_DECODER.decode(normalized).map_err(|err| {
            warn!(?err, "failed to decode base64");
            err
        })?;
        self.import_bytes(&bytes);
        Ok(())
    }

    /// Renders every serialized byte as 8 binary digits, least-significant bit first,
    /// separated by spaces.
    fn dump(&self) -> String {
        dump(&self.to_bytes())
    }
}

/// Renders `bytes` as space-separated, bit-reversed binary octets.
fn dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:08b}", byte.reverse_bits()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Converts a write index into a storage index.
fn checked_index(index: i64) -> Result<usize, Error> {
    if index < 0 {
        return Err(Error::NegativeIndex(index));
    }

    // Only reachable where `usize` is narrower than `i64`. The length is stored as
    // `index + 1`, so the last addressable index is `usize::MAX - 1`.
    match usize::try_from(index) {
        Ok(index) if index < usize::MAX => Ok(index),
        _ => Err(Error::Capacity(index)),
    }
}

/// Converts a read index into a storage index, if it is addressable at all.
fn read_index(index: i64) -> Option<usize> {
    usize::try_from(index).ok()
}

/// Logs the reset caused by importing empty data.
fn log_reset(store: &'static str) {
    debug!(store, "reset to empty");
}

/// Writes a bit length as a `u64` varint, so the encoding does not depend on the host.
fn write_len(len: usize, buf: &mut impl BufMut) {
    UInt(len as u64).write(buf);
}

/// Returns the encoded size of a bit length written by [write_len].
fn len_encode_size(len: usize) -> usize {
    UInt(len as u64).encode_size()
}

/// Reads a bit length written by [write_len], rejecting lengths outside `range`.
fn read_len(buf: &mut impl Buf, range: &LengthCfg) -> Result<usize, CodecError> {
    let len: u64 = UInt::read(buf)?.into();
    let len = usize::try_from(len).map_err(|_| CodecError::Invalid("BitVector", "length"))?;
    if !range.contains(&len) {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(len)
}

/// Reads the `ceil(len / 8)` payload bytes that follow an encoded bit length.
///
/// Bits at or beyond `len` must be unset.
fn read_payload(buf: &mut impl Buf, len: usize) -> Result<Vec<u8>, CodecError> {
    let num_bytes = len.div_ceil(8);
    if buf.remaining() < num_bytes {
        return Err(CodecError::EndOfBuffer);
    }
    let mut payload = vec![0; num_bytes];
    buf.copy_to_slice(&mut payload);

    let used = len % 8;
    if used != 0 {
        if let Some(last) = payload.last() {
            if last >> used != 0 {
                return Err(CodecError::Invalid("BitVector", "trailing bits"));
            }
        }
    }
    Ok(payload)
}
