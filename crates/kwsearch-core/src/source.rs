//! Text sources feeding the chunking pipeline.

use std::io::{self, Read};

use encoding_rs::{CoderResult, Decoder, Encoding};

use crate::traits::TextSource;

/// Characters of an in-memory string.
pub struct StrSource<'a> {
    rest: &'a str,
}

impl<'a> StrSource<'a> {
    pub fn new(text: &'a str) -> Self { Self { rest: text } }
}

impl TextSource for StrSource<'_> {
    fn read_into(&mut self, buf: &mut String, max_chars: usize) -> io::Result<usize> {
        let (end, n) = prefix_len(self.rest, max_chars);
        buf.push_str(&self.rest[..end]);
        self.rest = &self.rest[end..];
        Ok(n)
    }
}

/// Decodes a byte reader, sniffing a BOM first and falling back to the
/// configured encoding when there is none.
pub struct DecodingSource<R> {
    reader: R,
    decoder: Decoder,
    raw: Vec<u8>,
    decoded: String,
    pos: usize,
    eof: bool,
    pending_error: Option<io::Error>,
}

const RAW_BUF_BYTES: usize = 64 * 1024;

impl<R: Read> DecodingSource<R> {
    pub fn new(reader: R, fallback: &'static Encoding) -> Self {
        Self {
            reader,
            decoder: fallback.new_decoder(),
            raw: vec![0; RAW_BUF_BYTES],
            decoded: String::new(),
            pos: 0,
            eof: false,
            pending_error: None,
        }
    }

    pub fn utf8(reader: R) -> Self { Self::new(reader, encoding_rs::UTF_8) }

    fn fill(&mut self) -> io::Result<()> {
        self.decoded.clear();
        self.pos = 0;
        let n = loop {
            match self.reader.read(&mut self.raw) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        let last = n == 0;
        self.eof = last;
        let mut src = &self.raw[..n];
        loop {
            if let Some(needed) = self.decoder.max_utf8_buffer_length(src.len()) {
                self.decoded.reserve(needed);
            }
            let (result, read, _) = self.decoder.decode_to_string(src, &mut self.decoded, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => return Ok(()),
                CoderResult::OutputFull => continue,
            }
        }
    }
}

impl<R: Read> TextSource for DecodingSource<R> {
    fn read_into(&mut self, buf: &mut String, max_chars: usize) -> io::Result<usize> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        let mut taken = 0;
        while taken < max_chars {
            if self.pos == self.decoded.len() {
                if self.eof {
                    break;
                }
                if let Err(err) = self.fill() {
                    if taken == 0 {
                        return Err(err);
                    }
                    self.pending_error = Some(err);
                    break;
                }
                continue;
            }
            let rest = &self.decoded[self.pos..];
            let (end, n) = prefix_len(rest, max_chars - taken);
            buf.push_str(&rest[..end]);
            self.pos += end;
            taken += n;
        }
        Ok(taken)
    }
}

/// Byte length and char count of the first `max_chars` characters of `s`.
fn prefix_len(s: &str, max_chars: usize) -> (usize, usize) {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => (end, max_chars),
        None => (s.len(), s.chars().count()),
    }
}
