use crate::types::ChunkId;

/// Overlap window shared by the tail of chunk `base` and the head of the
/// chunk after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniChunk {
    pub base: ChunkId,
    pub text: String,
}

/// Cuts the overlap window out of the head of the following chunk.
///
/// The window is the first `W` characters of the next chunk, extended by up
/// to `W` more until whitespace so its last word is whole.
#[derive(Debug, Clone, Copy)]
pub struct OverlapExtractor {
    width: usize,
}

impl OverlapExtractor {
    pub fn new(width: usize) -> Self { Self { width } }

    /// Borrowed window at the head of `next_body`, at most `2W` characters.
    pub fn window<'a>(&self, next_body: &'a str) -> &'a str {
        let mut end = 0;
        for (taken, (i, c)) in next_body.char_indices().enumerate() {
            if taken >= self.width && (c.is_whitespace() || taken >= 2 * self.width) {
                break;
            }
            end = i + c.len_utf8();
        }
        &next_body[..end]
    }

    /// Builds the mini-chunk of `base`. `current_body` is only checked, the
    /// window is copied out of `next_body`.
    pub fn extract(&self, base: ChunkId, current_body: &str, next_body: &str) -> MiniChunk {
        debug_assert!(!current_body.is_empty(), "mini-chunk requested for an empty chunk");
        MiniChunk { base, text: self.window(next_body).to_string() }
    }
}
