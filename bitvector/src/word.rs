//! A bit vector packed into 64-bit words.
//!
//! Words are keyed by `index >> WORD_SHIFT`. In [Mode::Sparse], only the words that were written
//! (or that decoded to a non-zero value) are stored and every other word reads as zero. In
//! [Mode::Dense], every word from 0 to the highest one written is stored.

use crate::{
    checked_index, len_encode_size, log_reset, read_index, read_len, read_payload, write_len,
    BitVector, Error, LengthCfg,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use core::fmt::{self, Display, Formatter};
use std::collections::{BTreeMap, TryReserveError};
use tracing::{debug, trace, warn};

/// The storage unit of a [WordBitVector].
pub type Word = u64;

/// Number of bits in a [Word].
pub const WORD_BITS: usize = Word::BITS as usize;

/// Shift that converts a bit index into a [Word] index.
pub const WORD_SHIFT: u32 = Word::BITS.trailing_zeros();

/// Number of bytes in a [Word].
pub const WORD_BYTES: usize = WORD_BITS / 8;

/// Empty word (all bits set to 0).
const EMPTY_WORD: Word = 0;

/// How a [WordBitVector] materializes words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Only written words are stored. Gaps read as zero.
    #[default]
    Sparse,
    /// Every word up to the highest one written is stored, zero-filled on growth.
    Dense,
}

/// Word storage, keyed by word index. Absent words are zero.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Words {
    Sparse(BTreeMap<usize, Word>),
    Dense(Vec<Word>),
}

impl Words {
    fn new(mode: Mode) -> Self {
        match mode {
            Mode::Sparse => Self::Sparse(BTreeMap::new()),
            Mode::Dense => Self::Dense(Vec::new()),
        }
    }

    fn mode(&self) -> Mode {
        match self {
            Self::Sparse(_) => Mode::Sparse,
            Self::Dense(_) => Mode::Dense,
        }
    }

    /// Returns the word at `index`, or [EMPTY_WORD] if it is not materialized.
    fn get(&self, index: usize) -> Word {
        let word = match self {
            Self::Sparse(words) => words.get(&index),
            Self::Dense(words) => words.get(index),
        };
        word.copied().unwrap_or(EMPTY_WORD)
    }

    /// Returns the word at `index`, materializing it (and in dense mode, every word before it).
    ///
    /// Dense storage is left untouched if it cannot grow.
    fn get_mut(&mut self, index: usize) -> Result<&mut Word, TryReserveError> {
        match self {
            Self::Sparse(words) => Ok(words.entry(index).or_insert(EMPTY_WORD)),
            Self::Dense(words) => {
                if index >= words.len() {
                    trace!(from = words.len(), words = index + 1, "growing dense words");
                    words.try_reserve_exact(index + 1 - words.len())?;
                    words.resize(index + 1, EMPTY_WORD);
                }
                Ok(&mut words[index])
            }
        }
    }

    /// Stores a decoded word. Words must be pushed in ascending index order.
    fn push(&mut self, index: usize, word: Word) {
        match self {
            Self::Sparse(words) => {
                if word != EMPTY_WORD {
                    words.insert(index, word);
                }
            }
            Self::Dense(words) => {
                debug_assert_eq!(words.len(), index, "words pushed out of order");
                words.push(word);
            }
        }
    }

    /// Returns the number of materialized words.
    fn materialized(&self) -> usize {
        match self {
            Self::Sparse(words) => words.len(),
            Self::Dense(words) => words.len(),
        }
    }
}

/// A growable bit vector backed by 64-bit words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordBitVector {
    /// The underlying storage for the bits.
    words: Words,

    /// One past the highest word index ever materialized.
    word_count: usize,

    /// One past the highest bit index ever set.
    len: usize,
}

impl WordBitVector {
    /// Creates an empty vector that materializes words according to `mode`.
    pub fn new(mode: Mode) -> Self {
        Self {
            words: Words::new(mode),
            word_count: 0,
            len: 0,
        }
    }

    /// Creates an empty [Mode::Sparse] vector.
    pub fn sparse() -> Self {
        Self::new(Mode::Sparse)
    }

    /// Creates an empty [Mode::Dense] vector.
    pub fn dense() -> Self {
        Self::new(Mode::Dense)
    }

    /// Creates a vector of `mode` holding `bytes` (see [BitVector::import_bytes]).
    pub fn from_bytes(mode: Mode, bytes: &[u8]) -> Self {
        let mut vector = Self::new(mode);
        vector.import_bytes(bytes);
        vector
    }

    /// Returns how this vector materializes words.
    pub fn mode(&self) -> Mode {
        self.words.mode()
    }

    /// Returns one past the highest word index ever materialized.
    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Returns the number of bits of storage actually materialized.
    pub fn size(&self) -> usize {
        self.words.materialized() * WORD_BITS
    }

    /// Writes the `ceil(len / 8)` serialized bytes, one little-endian word at a time.
    fn write_payload(&self, buf: &mut impl BufMut) {
        let mut remaining = self.len.div_ceil(8);
        let mut word_index = 0;
        while remaining > 0 {
            // Unmaterialized words are emitted as zero
            let bytes = self.words.get(word_index).to_le_bytes();
            let take = remaining.min(WORD_BYTES);
            buf.put_slice(&bytes[..take]);
            remaining -= take;
            word_index += 1;
        }
    }

    #[inline(always)]
    fn word_index(index: usize) -> usize {
        index >> WORD_SHIFT
    }

    #[inline(always)]
    fn bit_offset(index: usize) -> usize {
        index % WORD_BITS
    }
}

impl Default for WordBitVector {
    fn default() -> Self {
        Self::sparse()
    }
}

impl BitVector for WordBitVector {
    fn len(&self) -> usize {
        self.len
    }

    fn set(&mut self, index: i64) -> Result<(), Error> {
        let bit = checked_index(index)?;
        let word_index = Self::word_index(bit);
        let word = self.words.get_mut(word_index).map_err(|err| {
            warn!(?err, index, "failed to grow words");
            Error::Capacity(index)
        })?;
        *word |= 1 << Self::bit_offset(bit);
        self.word_count = self.word_count.max(word_index + 1);
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
        let word = self.words.get(Self::word_index(index));
        (word & (1 << Self::bit_offset(index))) != 0
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len.div_ceil(8));
        self.write_payload(&mut bytes);
        bytes
    }

    fn import_bytes(&mut self, bytes: &[u8]) {
        let mode = self.mode();
        if bytes.is_empty() {
            log_reset("word");
            *self = Self::new(mode);
            return;
        }

        // The final chunk is zero-padded to a full word
        let mut words = Words::new(mode);
        let mut word_count = 0;
        for (word_index, chunk) in bytes.chunks(WORD_BYTES).enumerate() {
            let mut padded = [0u8; WORD_BYTES];
            padded[..chunk.len()].copy_from_slice(chunk);
            words.push(word_index, Word::from_le_bytes(padded));
            word_count = word_index + 1;
        }
        debug!(
            ?mode,
            bytes = bytes.len(),
            materialized = words.materialized(),
            "imported words"
        );

        self.words = words;
        self.word_count = word_count;
        self.len = bytes.len() * 8;
    }
}

impl Display for WordBitVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

// ---------- Codec ----------

impl Write for WordBitVector {
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len, buf);
        self.write_payload(buf);
    }
}

impl Read for WordBitVector {
    type Cfg = (LengthCfg, Mode);

    fn read_cfg(buf: &mut impl Buf, (range, mode): &Self::Cfg) -> Result<Self, CodecError> {
        let len = read_len(buf, range)?;
        let payload = read_payload(buf, len)?;

        let mut vector = Self::new(*mode);
        vector.import_bytes(&payload);
        vector.len = len;
        Ok(vector)
    }
}

impl EncodeSize for WordBitVector {
    fn encode_size(&self) -> usize {
        len_encode_size(self.len) + self.len.div_ceil(8)
    }
}
