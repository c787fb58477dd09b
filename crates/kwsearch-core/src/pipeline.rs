//! Per-document chunking pipeline.
//!
//! Chunk N is held back until chunk N+1 has been read, because its indexed
//! text and its mini-chunk both need the head of chunk N+1. Sink order is
//! `begin, chunk 1, mini 1, chunk 2, mini 2, ..., chunk n, metadata`.

use std::time::{Duration, Instant};

use crate::chunker::{encode_chunk, ChunkBuffer, ChunkLimits};
use crate::config::ChunkingSettings;
use crate::error::{Error, ExtractionError, SinkError};
use crate::overlap::{MiniChunk, OverlapExtractor};
use crate::traits::{
    Cancellation, ChunkSubmission, FixedLanguage, IndexSink, LanguageTagger, MetadataSubmission, MiniChunkSubmission,
    TextSource,
};
use crate::types::{ChunkId, Charset, Language, SourceDocument};

/// When the pipeline calls [`IndexSink::flush_hint`]. Both triggers are
/// optional; the first to trip wins and resets both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushPolicy {
    pub every_chunks: Option<u32>,
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { chunks: u32 },
    Cancelled { chunks: u32 },
}

impl ProcessOutcome {
    pub fn chunks(&self) -> u32 {
        match self {
            Self::Completed { chunks } | Self::Cancelled { chunks } => *chunks,
        }
    }

    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled { .. }) }
}

/// Splits one document at a time into chunks and mini-chunks and feeds them
/// to an [`IndexSink`]. Not shared between threads; build one per worker.
pub struct ChunkingPipeline<'a> {
    buffer: ChunkBuffer,
    overlap: OverlapExtractor,
    held: String,
    tagger: Option<Box<dyn LanguageTagger>>,
    submitter: Submitter<'a>,
}

impl<'a> ChunkingPipeline<'a> {
    /// Fails if `limits` do not pass [`ChunkLimits::validate`].
    pub fn new(sink: &'a dyn IndexSink, limits: ChunkLimits) -> Result<Self, Error> {
        Ok(Self {
            buffer: ChunkBuffer::new(limits)?,
            overlap: OverlapExtractor::new(limits.overlap_chars),
            held: String::new(),
            tagger: None,
            submitter: Submitter {
                sink,
                charset: Charset::Utf8,
                encoded: Vec::new(),
                flush: FlushPolicy::default(),
                since_flush: 0,
                last_flush: Instant::now(),
            },
        })
    }

    pub fn from_settings(sink: &'a dyn IndexSink, settings: &ChunkingSettings) -> Result<Self, Error> {
        let pipeline = Self::new(sink, settings.limits())?
            .with_charset(settings.charset)
            .with_flush_policy(settings.flush_policy());
        Ok(match settings.language {
            Some(language) => pipeline.with_language_tagger(Box::new(FixedLanguage(language))),
            None => pipeline,
        })
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.submitter.charset = charset;
        self
    }

    pub fn with_language_tagger(mut self, tagger: Box<dyn LanguageTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    pub fn with_flush_policy(mut self, flush: FlushPolicy) -> Self {
        self.submitter.flush = flush;
        self
    }

    /// Chunks `source` and submits everything for `doc`.
    ///
    /// Cancellation is checked between chunks. A failing source still gets
    /// its partial content and metadata indexed before the error is returned;
    /// a failing sink aborts at once.
    pub fn process<S: TextSource + ?Sized>(
        &mut self,
        doc: &SourceDocument,
        source: &mut S,
        cancel: &dyn Cancellation,
    ) -> Result<ProcessOutcome, ExtractionError> {
        let object_id = doc.object_id;
        self.buffer.reset();
        self.held.clear();
        let mut has_held = false;
        let mut held_language: Option<Language> = None;
        let mut submitted: u32 = 0;
        self.submitter.sink.begin_document(object_id).map_err(sink_failure(object_id, 0))?;

        loop {
            if cancel.is_cancelled() {
                if has_held {
                    let id = ChunkId::new(object_id, submitted + 1);
                    self.submitter
                        .last_chunk(id, &doc.name, &self.held, held_language)
                        .map_err(sink_failure(object_id, submitted))?;
                    submitted += 1;
                }
                self.submitter.metadata(doc, submitted).map_err(sink_failure(object_id, submitted))?;
                tracing::info!(object_id, chunks = submitted, "extraction cancelled");
                return Ok(ProcessOutcome::Cancelled { chunks: submitted });
            }

            match self.buffer.next_chunk(source) {
                Ok(Some(next)) => {
                    if has_held {
                        let id = ChunkId::new(object_id, submitted + 1);
                        let mini = self.overlap.extract(id, &self.held, next);
                        self.submitter
                            .chunk(id, &doc.name, &self.held, &mini.text, held_language)
                            .map_err(sink_failure(object_id, submitted))?;
                        submitted += 1;
                        self.submitter
                            .mini_chunk(&mini, held_language)
                            .map_err(sink_failure(object_id, submitted))?;
                    }
                }
                Ok(None) => {
                    if has_held {
                        let id = ChunkId::new(object_id, submitted + 1);
                        self.submitter
                            .last_chunk(id, &doc.name, &self.held, held_language)
                            .map_err(sink_failure(object_id, submitted))?;
                        submitted += 1;
                    }
                    self.submitter.metadata(doc, submitted).map_err(sink_failure(object_id, submitted))?;
                    tracing::debug!(object_id, chunks = submitted, "document indexed");
                    return Ok(ProcessOutcome::Completed { chunks: submitted });
                }
                Err(err) => {
                    if has_held {
                        let id = ChunkId::new(object_id, submitted + 1);
                        self.submitter
                            .last_chunk(id, &doc.name, &self.held, held_language)
                            .map_err(sink_failure(object_id, submitted))?;
                        submitted += 1;
                    }
                    if let Err(e) = self.submitter.metadata(doc, submitted) {
                        tracing::warn!(object_id, error = %e, "metadata for partially read document not indexed");
                    }
                    tracing::warn!(object_id, chunks = submitted, error = %err, "text stream failed, partial content indexed");
                    return Err(ExtractionError::StreamRead { object_id, chunks_indexed: submitted, source: err });
                }
            }

            self.buffer.swap_text(&mut self.held);
            has_held = true;
            held_language = self.tagger.as_ref().and_then(|t| t.tag(&self.held));
        }
    }
}

fn sink_failure(object_id: i64, chunks_indexed: u32) -> impl FnOnce(SinkError) -> ExtractionError {
    move |source| {
        tracing::error!(object_id, chunks = chunks_indexed, error = %source, "index sink rejected document");
        ExtractionError::SinkSubmit { object_id, chunks_indexed, source }
    }
}

/// Encodes and forwards documents, and keeps the flush cadence.
struct Submitter<'a> {
    sink: &'a dyn IndexSink,
    charset: Charset,
    encoded: Vec<u8>,
    flush: FlushPolicy,
    since_flush: u32,
    last_flush: Instant,
}

impl Submitter<'_> {
    fn chunk(
        &mut self,
        id: ChunkId,
        file_name: &str,
        body: &str,
        window: &str,
        language: Option<Language>,
    ) -> Result<(), SinkError> {
        self.send_chunk(id, file_name, body, window, language, false)
    }

    fn last_chunk(&mut self, id: ChunkId, file_name: &str, body: &str, language: Option<Language>) -> Result<(), SinkError> {
        self.send_chunk(id, file_name, body, "", language, true)
    }

    fn send_chunk(
        &mut self,
        id: ChunkId,
        file_name: &str,
        body: &str,
        window: &str,
        language: Option<Language>,
        is_final: bool,
    ) -> Result<(), SinkError> {
        encode_chunk(&[body, window], self.charset, &mut self.encoded);
        let submission = ChunkSubmission {
            id,
            file_name,
            bytes: &self.encoded,
            charset: self.charset,
            body_chars: body.chars().count(),
            language,
            is_final,
        };
        self.sink.submit_chunk(&submission)?;
        tracing::trace!(chunk = %id, bytes = self.encoded.len(), is_final, "chunk submitted");
        self.since_flush += 1;
        self.maybe_flush();
        Ok(())
    }

    fn mini_chunk(&mut self, mini: &MiniChunk, language: Option<Language>) -> Result<(), SinkError> {
        encode_chunk(&[&mini.text], self.charset, &mut self.encoded);
        let submission = MiniChunkSubmission { id: mini.base.mini(), bytes: &self.encoded, charset: self.charset, language };
        self.sink.submit_mini_chunk(&submission)
    }

    fn metadata(&self, doc: &SourceDocument, num_chunks: u32) -> Result<(), SinkError> {
        self.sink.submit_metadata(&MetadataSubmission {
            object_id: doc.object_id,
            num_chunks,
            file_name: &doc.name,
            fields: &doc.fields,
        })
    }

    fn maybe_flush(&mut self) {
        let by_count = self.flush.every_chunks.is_some_and(|n| n > 0 && self.since_flush >= n);
        let by_time = self.flush.interval.is_some_and(|d| self.last_flush.elapsed() >= d);
        if !(by_count || by_time) {
            return;
        }
        if let Err(e) = self.sink.flush_hint() {
            tracing::warn!(error = %e, "flush hint failed");
        }
        self.since_flush = 0;
        self.last_flush = Instant::now();
    }
}
