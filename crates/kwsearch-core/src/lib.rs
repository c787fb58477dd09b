#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod overlap;
pub mod pipeline;
pub mod source;
pub mod traits;
pub mod types;

pub use chunker::{encode_chunk, ChunkBuffer, ChunkLimits};
pub use error::{Error, ExtractionError, QueryError, SinkError};
pub use overlap::{MiniChunk, OverlapExtractor};
pub use pipeline::{ChunkingPipeline, FlushPolicy, ProcessOutcome};
pub use source::{DecodingSource, StrSource};
pub use types::{ChunkId, DocumentId, KeywordHit, Language, MiniChunkId, SourceDocument, TextField};
