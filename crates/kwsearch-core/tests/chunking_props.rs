use proptest::prelude::*;

use kwsearch_core::{ChunkBuffer, ChunkLimits, OverlapExtractor, StrSource};

fn limits() -> ChunkLimits {
    ChunkLimits { max_chunk_chars: 32, single_read_chars: 5, extra_margin_chars: 3, overlap_chars: 4 }
}

fn split(text: &str) -> Vec<String> {
    let mut buffer = ChunkBuffer::new(limits()).unwrap();
    let mut source = StrSource::new(text);
    let mut chunks = Vec::new();
    while let Some(chunk) = buffer.next_chunk(&mut source).unwrap() {
        chunks.push(chunk.to_string());
    }
    chunks
}

proptest! {
    #[test]
    fn chunks_reconstruct_and_stay_in_bounds(text in "[a-zé ]{0,300}") {
        let chunks = split(&text);
        prop_assert_eq!(chunks.concat(), text);
        if let Some((_, rest)) = chunks.split_last() {
            for chunk in rest {
                let n = chunk.chars().count();
                prop_assert!(n >= limits().floor() && n <= limits().max_chunk_chars);
                prop_assert!(n == limits().max_chunk_chars || chunk.ends_with(' '));
            }
        }
    }

    #[test]
    fn window_is_a_bounded_prefix(text in "\\PC{0,80}") {
        let ex = OverlapExtractor::new(4);
        let window = ex.window(&text);
        prop_assert!(text.starts_with(window));
        prop_assert!(window.chars().count() <= 8);
    }
}
