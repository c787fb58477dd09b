//! Seams between the chunking/reconciliation logic and its collaborators.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{QueryError, SinkError};
use crate::types::{ChunkId, Charset, Language, Meta, MiniChunkId, TextField};

/// A pull-based stream of decoded characters.
pub trait TextSource {
    /// Appends up to `max_chars` characters to `buf` and returns how many
    /// were appended. `Ok(0)` means end of stream.
    fn read_into(&mut self, buf: &mut String, max_chars: usize) -> io::Result<usize>;
}

impl<T: TextSource + ?Sized> TextSource for &mut T {
    fn read_into(&mut self, buf: &mut String, max_chars: usize) -> io::Result<usize> { (**self).read_into(buf, max_chars) }
}

impl<T: TextSource + ?Sized> TextSource for Box<T> {
    fn read_into(&mut self, buf: &mut String, max_chars: usize) -> io::Result<usize> { (**self).read_into(buf, max_chars) }
}

/// Cooperative cancellation, polled between chunks.
pub trait Cancellation: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool { self.load(Ordering::Relaxed) }
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool { self() }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool { false }
}

/// Assigns a stemming language to a chunk body.
pub trait LanguageTagger: Send + Sync {
    fn tag(&self, text: &str) -> Option<Language>;
}

/// Tags every chunk with the same language.
#[derive(Debug, Clone, Copy)]
pub struct FixedLanguage(pub Language);

impl LanguageTagger for FixedLanguage {
    fn tag(&self, _text: &str) -> Option<Language> { Some(self.0) }
}

/// One chunk document: the body plus, unless final, the overlap window.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSubmission<'a> {
    pub id: ChunkId,
    pub file_name: &'a str,
    /// BOM-prefixed text in `charset`.
    pub bytes: &'a [u8],
    pub charset: Charset,
    /// Number of body characters; the window follows them.
    pub body_chars: usize,
    pub language: Option<Language>,
    pub is_final: bool,
}

impl ChunkSubmission<'_> {
    pub fn text(&self) -> String { self.charset.decode(self.bytes) }
}

#[derive(Debug, Clone, Copy)]
pub struct MiniChunkSubmission<'a> {
    pub id: MiniChunkId,
    pub bytes: &'a [u8],
    pub charset: Charset,
    pub language: Option<Language>,
}

impl MiniChunkSubmission<'_> {
    pub fn text(&self) -> String { self.charset.decode(self.bytes) }
}

/// Parent record (chunk index 0) sent once all chunks of a document are in.
#[derive(Debug, Clone, Copy)]
pub struct MetadataSubmission<'a> {
    pub object_id: i64,
    pub num_chunks: u32,
    pub file_name: &'a str,
    pub fields: &'a Meta,
}

/// Destination for chunk, mini-chunk and metadata documents.
///
/// Submitting an id that already exists replaces the stored document.
pub trait IndexSink: Send + Sync {
    /// Called once before the first chunk of `object_id`. Everything indexed
    /// under that object id by an earlier run must be gone afterwards, since
    /// the new run may produce fewer chunks.
    fn begin_document(&self, object_id: i64) -> Result<(), SinkError>;
    fn submit_chunk(&self, chunk: &ChunkSubmission<'_>) -> Result<(), SinkError>;
    fn submit_mini_chunk(&self, mini: &MiniChunkSubmission<'_>) -> Result<(), SinkError>;
    fn submit_metadata(&self, meta: &MetadataSubmission<'_>) -> Result<(), SinkError>;

    /// Good moment to make submissions durable. Purely advisory.
    fn flush_hint(&self) -> Result<(), SinkError> { Ok(()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field: TextField,
    /// Query in the engine's syntax.
    pub query: String,
}

/// Disjunction of per-field queries.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub clauses: Vec<FieldQuery>,
    pub limit: usize,
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchDocument {
    pub id: String,
    /// Engine highlights keyed by the field that produced them.
    pub highlights: BTreeMap<TextField, String>,
}

/// Read side of the full-text engine.
pub trait SearchService: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<Vec<SearchDocument>, QueryError>;

    /// Occurrences of `term` in `field` of `doc_id`. `None` when the engine
    /// cannot tell.
    fn term_frequency(&self, field: TextField, term: &str, doc_id: &str) -> Result<Option<u32>, QueryError>;

    fn language_fields(&self) -> Vec<TextField>;

    fn indexed_document_count(&self) -> Result<u64, QueryError>;

    /// Stored text of a field, if the document and the field exist.
    fn stored_text(&self, doc_id: &str, field: TextField) -> Result<Option<String>, QueryError>;
}
