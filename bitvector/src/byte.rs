//! A bit vector packed into a byte buffer.

use crate::{
    checked_index, len_encode_size, log_reset, read_index, read_len, read_payload, write_len,
    BitVector, Error, LengthCfg,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use core::fmt::{self, Display, Formatter};
use std::collections::TryReserveError;
use tracing::{debug, trace, warn};

/// Number of bytes allocated by a fresh [ByteBitVector].
pub const MIN_CAPACITY: usize = 8;

/// A growable bit vector backed by a byte buffer.
///
/// The buffer grows to the next power of two that covers the highest byte written and never
/// shrinks. Bytes beyond [ByteBitVector::char_length] are allocated but never serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteBitVector {
    /// The allocated buffer. Its length is the capacity of the vector.
    data: Vec<u8>,

    /// One past the highest byte index ever touched.
    char_length: usize,

    /// One past the highest bit index ever set.
    len: usize,
}

impl ByteBitVector {
    /// Creates an empty vector with [MIN_CAPACITY] bytes allocated.
    pub fn new() -> Self {
        Self {
            data: vec![0; MIN_CAPACITY],
            char_length: 0,
            len: 0,
        }
    }

    /// Creates a vector holding `bytes` (see [BitVector::import_bytes]).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut vector = Self::new();
        vector.import_bytes(bytes);
        vector
    }

    /// Returns one past the highest byte index ever touched.
    pub fn char_length(&self) -> usize {
        self.char_length
    }

    /// Returns the number of bytes allocated.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the serialized bytes without copying them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.char_length]
    }

    /// Grows the buffer so that `byte_index` is addressable.
    ///
    /// The buffer is left untouched if it cannot grow.
    fn reserve(&mut self, byte_index: usize) -> Result<(), TryReserveError> {
        if byte_index < self.data.len() {
            return Ok(());
        }
        let capacity = (byte_index + 1).next_power_of_two().max(MIN_CAPACITY);
        trace!(from = self.data.len(), capacity, "growing byte buffer");
        self.data.try_reserve_exact(capacity - self.data.len())?;
        self.data.resize(capacity, 0);
        Ok(())
    }

    #[inline(always)]
    fn byte_index(index: usize) -> usize {
        index >> 3
    }

    #[inline(always)]
    fn bit_offset(index: usize) -> usize {
        index % 8
    }
}

impl Default for ByteBitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl BitVector for ByteBitVector {
    fn len(&self) -> usize {
        self.len
    }

    fn set(&mut self, index: i64) -> Result<(), Error> {
        let bit = checked_index(index)?;
        let byte_index = Self::byte_index(bit);
        self.reserve(byte_index).map_err(|err| {
            warn!(?err, index, "failed to grow byte buffer");
            Error::Capacity(index)
        })?;
        self.data[byte_index] |= 1 << Self::bit_offset(bit);
        self.char_length = self.char_length.max(byte_index + 1);
        self.len = self.len.max(bit + 1);
        Ok(())
    }

    fn get(&self, index: i64) -> bool {
        let Some(index) = read_index(index) else {
            return false;
        };
        if index >= self.len {
            return false;
        }
        (self.data[Self::byte_index(index)] & (1 << Self::bit_offset(index))) != 0
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn import_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            log_reset("byte");
            *self = Self::new();
            return;
        }
        debug!(bytes = bytes.len(), "imported bytes");

        // The buffer is replaced wholesale: capacity is exactly the input size
        self.data = bytes.to_vec();
        self.char_length = bytes.len();
        self.len = bytes.len() * 8;
    }
}

impl Display for ByteBitVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::dump(self.as_bytes()))
    }
}

// ---------- Codec ----------

impl Write for ByteBitVector {
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len, buf);
        buf.put_slice(self.as_bytes());
    }
}

impl Read for ByteBitVector {
    type Cfg = LengthCfg;

    fn read_cfg(buf: &mut impl Buf, range: &Self::Cfg) -> Result<Self, CodecError> {
        let len = read_len(buf, range)?;
        let payload = read_payload(buf, len)?;

        let mut vector = Self::from_bytes(&payload);
        vector.len = len;
        Ok(vector)
    }
}

impl EncodeSize for ByteBitVector {
    fn encode_size(&self) -> usize {
        len_encode_size(self.len) + self.char_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{Decode, Encode};
    use commonware_macros::test_traced;

    #[test]
    fn test_new() {
        let vector = ByteBitVector::new();
        assert_eq!(vector.len(), 0);
        assert!(vector.is_empty());
        assert_eq!(vector.capacity(), MIN_CAPACITY);
        assert_eq!(vector.char_length(), 0);
        assert!(vector.as_bytes().is_empty());
        assert_eq!(vector, ByteBitVector::default());
    }

    #[test_traced]
    fn test_growth_power_of_two() {
        let mut vector = ByteBitVector::new();

        // Within the initial allocation
        vector.set(63).unwrap();
        assert_eq!(vector.capacity(), 8);
        assert_eq!(vector.char_length(), 8);

        // Byte 8 needs 9 bytes, rounded up to 16
        vector.set(64).unwrap();
        assert_eq!(vector.capacity(), 16);
        assert_eq!(vector.char_length(), 9);

        // Byte 125 needs 126 bytes, rounded up to 128
        vector.set(1000).unwrap();
        assert_eq!(vector.capacity(), 128);
        assert_eq!(vector.char_length(), 126);
        assert_eq!(vector.len(), 1001);

        // Writing below the capacity never reallocates
        vector.set(500).unwrap();
        assert_eq!(vector.capacity(), 128);
    }

    #[test_traced]
    fn test_growth_preserves_low_bits() {
        let mut vector = ByteBitVector::new();
        let low = [0, 1, 7, 8, 31, 42, 63];
        for i in low {
            vector.set(i).unwrap();
        }
        vector.set(1000).unwrap();

        for i in 0..64 {
            assert_eq!(vector.get(i), low.contains(&i), "bit {i}");
        }
        for i in 64..1000 {
            assert!(!vector.get(i), "bit {i}");
        }
        assert!(vector.get(1000));
    }

    #[test_traced]
    fn test_growth_failure_leaves_state() {
        let mut vector = ByteBitVector::new();
        vector.set(100).unwrap();

        assert!(matches!(
            vector.set(i64::MAX),
            Err(Error::Capacity(i64::MAX))
        ));
        assert_eq!(vector.len(), 101);
        assert_eq!(vector.capacity(), 16);
        assert_eq!(vector.char_length(), 13);
        assert!(vector.get(100));

        // Later writes still succeed
        vector.set(200).unwrap();
        assert_eq!(vector.len(), 201);
    }

    #[test_traced]
    fn test_get_masks_single_bit() {
        let mut vector = ByteBitVector::new();
        vector.set(1).unwrap();
        vector.set(10).unwrap();

        // Neighboring bits in the same byte stay unset
        assert!(!vector.get(0));
        assert!(vector.get(1));
        assert!(!vector.get(2));
        assert!(!vector.get(9));
        assert!(vector.get(10));
    }

    #[test_traced]
    fn test_to_bytes_hides_capacity() {
        let mut vector = ByteBitVector::new();
        vector.set(12).unwrap();
        assert_eq!(vector.capacity(), 8);
        assert_eq!(vector.to_bytes(), vec![0, 0b0001_0000]);
    }

    #[test_traced]
    fn test_import_bytes_exact_capacity() {
        let mut vector = ByteBitVector::new();
        vector.set(3).unwrap();

        vector.import_bytes(&[0xff, 0x00, 0x81]);
        assert_eq!(vector.capacity(), 3);
        assert_eq!(vector.char_length(), 3);
        assert_eq!(vector.len(), 24);
        assert_eq!(vector.as_bytes(), &[0xff, 0x00, 0x81]);
        assert!(vector.get(7));
        assert!(!vector.get(8));
        assert!(vector.get(16));
        assert!(vector.get(23));

        // Growth resumes from the imported baseline
        vector.set(24).unwrap();
        assert_eq!(vector.capacity(), 8);
        assert_eq!(vector.char_length(), 4);
        assert_eq!(vector.len(), 25);
        assert!(vector.get(0));
        assert!(vector.get(24));
    }

    #[test_traced]
    fn test_import_bytes_empty_restores_fresh_state() {
        let mut vector = ByteBitVector::new();
        vector.set(4000).unwrap();
        vector.import_bytes(&[]);
        assert_eq!(vector, ByteBitVector::new());
    }

    #[test_traced]
    fn test_display() {
        let mut vector = ByteBitVector::new();
        vector.set(7).unwrap();
        vector.set(8).unwrap();
        vector.set(9).unwrap();
        assert_eq!(vector.to_string(), "00000001 11000000");
        assert_eq!(vector.to_string(), vector.dump());
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut original = ByteBitVector::new();
        for i in [2, 11, 77] {
            original.set(i).unwrap();
        }
        let mut buf = original.encode();
        assert_eq!(buf.len(), original.encode_size());

        let decoded = ByteBitVector::decode_cfg(&mut buf, &(..).into()).unwrap();
        assert_eq!(decoded.len(), 78);
        assert_eq!(decoded.as_bytes(), original.as_bytes());
        for i in 0..78 {
            assert_eq!(decoded.get(i), original.get(i));
        }
    }

    #[test]
    fn test_codec_error_invalid_length() {
        let mut original = ByteBitVector::new();
        original.set(20).unwrap();
        let buf = original.encode();

        let mut long = buf.clone();
        assert!(matches!(
            ByteBitVector::decode_cfg(&mut long, &(22usize..).into()),
            Err(CodecError::InvalidLength(21))
        ));
    }

    #[test]
    fn test_codec_error_end_of_buffer() {
        let mut original = ByteBitVector::new();
        original.set(20).unwrap();
        let buf = original.encode();

        let mut truncated = buf.clone().split_to(buf.len() - 1);
        assert!(matches!(
            ByteBitVector::decode_cfg(&mut truncated, &(..).into()),
            Err(CodecError::EndOfBuffer)
        ));
    }
}
