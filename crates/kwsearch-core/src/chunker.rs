//! Bounded chunking of a decoded text stream.
//!
//! A chunk is filled in `single_read_chars` units until the floor
//! `max - single_read - extra_margin` is reached, then one character at a
//! time until it ends on whitespace or hits `max_chunk_chars`. Text is never
//! dropped or rewritten, so the chunk bodies concatenate back to the input.

use std::io;

use crate::error::Error;
use crate::traits::TextSource;
use crate::types::Charset;

/// Byte-order mark sentinel written ahead of every encoded chunk.
pub const BOM_SENTINEL: char = '\u{FEFF}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Hard ceiling of a chunk body, in characters.
    pub max_chunk_chars: usize,
    /// Characters requested per bulk read.
    pub single_read_chars: usize,
    /// Slack kept below the ceiling for the whitespace search.
    pub extra_margin_chars: usize,
    /// Width `W` of the overlap window shared with the next chunk.
    pub overlap_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self { max_chunk_chars: 1024 * 1024, single_read_chars: 1024, extra_margin_chars: 128, overlap_chars: 2048 }
    }
}

impl ChunkLimits {
    /// Minimum body length of every non-final chunk.
    pub fn floor(&self) -> usize {
        self.max_chunk_chars.saturating_sub(self.single_read_chars + self.extra_margin_chars)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.single_read_chars == 0 {
            return Err(Error::InvalidConfig("chunking.single_read_chars must be positive".into()));
        }
        if self.overlap_chars == 0 {
            return Err(Error::InvalidConfig("chunking.overlap_chars must be positive".into()));
        }
        if self.max_chunk_chars <= self.single_read_chars + self.extra_margin_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.max_chunk_chars ({}) must exceed single_read_chars + extra_margin_chars ({})",
                self.max_chunk_chars,
                self.single_read_chars + self.extra_margin_chars
            )));
        }
        Ok(())
    }
}

/// Reusable accumulation buffer for the chunks of one document.
///
/// Owned by exactly one pipeline; the scratch string is cleared before every
/// chunk so nothing from a previous chunk or document can leak through.
/// Construction fails for limits that [`ChunkLimits::validate`] rejects.
pub struct ChunkBuffer {
    limits: ChunkLimits,
    text: String,
    chars: usize,
    pending_error: Option<io::Error>,
    exhausted: bool,
}

impl ChunkBuffer {
    pub fn new(limits: ChunkLimits) -> Result<Self, Error> {
        limits.validate()?;
        Ok(Self { limits, text: String::new(), chars: 0, pending_error: None, exhausted: false })
    }

    /// Prepares the buffer for a new document, keeping its allocation.
    pub fn reset(&mut self) {
        self.text.clear();
        self.chars = 0;
        self.pending_error = None;
        self.exhausted = false;
    }

    /// Reads the next chunk body from `source`.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. A read error that
    /// interrupts a partially filled chunk yields that chunk first and the
    /// error on the following call.
    pub fn next_chunk<S: TextSource + ?Sized>(&mut self, source: &mut S) -> io::Result<Option<&str>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.exhausted {
            return Ok(None);
        }
        self.text.clear();
        self.chars = 0;

        if let Err(err) = self.fill(source) {
            self.exhausted = true;
            if self.chars == 0 {
                return Err(err);
            }
            tracing::debug!(chars = self.chars, error = %err, "flushing partial chunk after read error");
            self.pending_error = Some(err);
        }
        if self.chars == 0 {
            return Ok(None);
        }
        Ok(Some(&self.text))
    }

    /// Hands the current body to the caller and takes `other`'s allocation
    /// as the next scratch buffer.
    pub fn swap_text(&mut self, other: &mut String) {
        std::mem::swap(&mut self.text, other);
        self.text.clear();
        self.chars = 0;
    }

    fn fill<S: TextSource + ?Sized>(&mut self, source: &mut S) -> io::Result<()> {
        let ceiling = self.limits.max_chunk_chars;
        let floor = self.limits.floor();
        while self.chars < floor {
            let want = self.limits.single_read_chars.min(ceiling - self.chars);
            if !self.read(source, want)? {
                return Ok(());
            }
        }
        while self.chars < ceiling && !self.text.ends_with(char::is_whitespace) {
            if !self.read(source, 1)? {
                return Ok(());
            }
        }
        Ok(())
    }

    fn read<S: TextSource + ?Sized>(&mut self, source: &mut S, want: usize) -> io::Result<bool> {
        let n = source.read_into(&mut self.text, want)?;
        debug_assert!(n <= want, "text source returned more characters than requested");
        if n == 0 {
            self.exhausted = true;
            return Ok(false);
        }
        self.chars += n;
        Ok(true)
    }
}

/// Encodes `parts` into `out` (cleared first), preceded by the BOM sentinel.
///
/// The sentinel goes through the same encoder as the text, so it lands as the
/// charset's native BOM bytes.
pub fn encode_chunk(parts: &[&str], charset: Charset, out: &mut Vec<u8>) {
    out.clear();
    let chars = std::iter::once(BOM_SENTINEL).chain(parts.iter().flat_map(|p| p.chars()));
    match charset {
        Charset::Utf8 => {
            let mut tmp = [0u8; 4];
            for c in chars {
                out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
        Charset::Utf16Le | Charset::Utf16Be => {
            let mut tmp = [0u16; 2];
            for c in chars {
                for unit in c.encode_utf16(&mut tmp).iter() {
                    let bytes = if charset == Charset::Utf16Le { unit.to_le_bytes() } else { unit.to_be_bytes() };
                    out.extend_from_slice(&bytes);
                }
            }
        }
    }
}
