use anyhow::Result;
use std::path::Path;
use std::sync::RwLock;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexWriter, TantivyDocument, Term};

use kwsearch_core::error::SinkError;
use kwsearch_core::traits::{ChunkSubmission, IndexSink, MetadataSubmission, MiniChunkSubmission};
use kwsearch_core::types::Language;

use crate::tantivy_utils::{build_schema, register_tokenizers, Fields, KIND_CHUNK, KIND_MINI, KIND_PARENT};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Tantivy-backed [`IndexSink`]. Submissions are upserts keyed on `id`, and
/// starting a document drops whatever its object id held before. Nothing is
/// visible to readers until [`TantivyIndexer::commit`].
pub struct TantivyIndexer {
	index: Index,
	fields: Fields,
	writer: RwLock<IndexWriter>,
}

impl TantivyIndexer {
	/// Creates a fresh index in `index_dir`, wiping whatever was there.
	pub fn new(index_dir: std::path::PathBuf) -> Result<Self, anyhow::Error> {
		if index_dir.exists() { std::fs::remove_dir_all(&index_dir)?; }
		std::fs::create_dir_all(&index_dir)?;
		let index = Index::create_in_dir(&index_dir, build_schema())?;
		Self::from_index(index)
	}

	/// Opens the index in `index_dir`, creating it if the directory is empty.
	pub fn open_or_create(index_dir: &Path) -> Result<Self, anyhow::Error> {
		std::fs::create_dir_all(index_dir)?;
		let directory = tantivy::directory::MmapDirectory::open(index_dir)?;
		let index = Index::open_or_create(directory, build_schema())?;
		Self::from_index(index)
	}

	pub fn create_in_ram() -> Result<Self, anyhow::Error> { Self::from_index(Index::create_in_ram(build_schema())) }

	fn from_index(index: Index) -> Result<Self, anyhow::Error> {
		register_tokenizers(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let writer = index.writer(WRITER_MEMORY_BYTES)?;
		Ok(Self { index, fields, writer: RwLock::new(writer) })
	}

	pub fn index(&self) -> &Index { &self.index }

	/// Makes all submissions so far durable and visible to new readers.
	pub fn commit(&self) -> Result<u64, anyhow::Error> {
		let mut writer = self.writer.write().map_err(|_| anyhow::anyhow!("index writer lock poisoned"))?;
		let opstamp = writer.commit()?;
		tracing::debug!(opstamp, "index committed");
		Ok(opstamp)
	}

	/// Drops every committed object whose id is above `last_object_id`, e.g.
	/// files that disappeared since the previous ingest. Takes effect on the
	/// next commit. Returns the number of objects dropped.
	pub fn prune_objects_above(&self, last_object_id: i64) -> Result<usize, anyhow::Error> {
		let searcher = self.index.reader()?.searcher();
		let parents = TermQuery::new(Term::from_field_text(self.fields.kind, KIND_PARENT), IndexRecordOption::Basic);
		let total = searcher.search(&parents, &Count)?;
		let top = searcher.search(&parents, &TopDocs::with_limit(total.max(1)))?;
		let writer = self.writer.read().map_err(|_| anyhow::anyhow!("index writer lock poisoned"))?;
		let mut pruned = 0;
		for (_, addr) in top {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(object_id) = doc.get_first(self.fields.object_id).and_then(|v| v.as_i64()) else { continue };
			if object_id > last_object_id {
				writer.delete_term(Term::from_field_i64(self.fields.object_id, object_id));
				pruned += 1;
			}
		}
		if pruned > 0 { tracing::info!(pruned, last_object_id, "stale objects scheduled for removal"); }
		Ok(pruned)
	}

	fn upsert(&self, id: &str, doc: TantivyDocument) -> Result<(), SinkError> {
		let writer = self.writer.read().map_err(|_| SinkError::new("index writer lock poisoned"))?;
		writer.delete_term(Term::from_field_text(self.fields.id, id));
		writer.add_document(doc).map_err(|e| SinkError::with_source(format!("failed to add document {}", id), e))?;
		Ok(())
	}

	fn base_doc(&self, id: &str, kind: &str, object_id: i64, chunk_index: u32) -> TantivyDocument {
		let mut doc = TantivyDocument::default();
		doc.add_text(self.fields.id, id);
		doc.add_text(self.fields.kind, kind);
		doc.add_i64(self.fields.object_id, object_id);
		doc.add_u64(self.fields.chunk_index, u64::from(chunk_index));
		doc
	}

	fn add_language_copy(&self, doc: &mut TantivyDocument, language: Option<Language>, text: &str) {
		if let Some(lang) = language {
			doc.add_text(self.fields.language, lang.tag());
			if let Some(field) = self.fields.stemmed.get(&lang) { doc.add_text(*field, text); }
		}
	}
}

impl IndexSink for TantivyIndexer {
	fn begin_document(&self, object_id: i64) -> Result<(), SinkError> {
		let writer = self.writer.read().map_err(|_| SinkError::new("index writer lock poisoned"))?;
		// Covers the parent, every chunk and every mini-chunk of the object.
		writer.delete_term(Term::from_field_i64(self.fields.object_id, object_id));
		Ok(())
	}

	fn submit_chunk(&self, chunk: &ChunkSubmission<'_>) -> Result<(), SinkError> {
		let id = chunk.id.to_string();
		let text = chunk.text();
		let mut doc = self.base_doc(&id, KIND_CHUNK, chunk.id.object_id, chunk.id.index);
		doc.add_u64(self.fields.chunk_size, chunk.body_chars as u64);
		doc.add_text(self.fields.file_name, chunk.file_name);
		self.add_language_copy(&mut doc, chunk.language, &text);
		doc.add_text(self.fields.text, text);
		self.upsert(&id, doc)
	}

	fn submit_mini_chunk(&self, mini: &MiniChunkSubmission<'_>) -> Result<(), SinkError> {
		let id = mini.id.to_string();
		let text = mini.text();
		let base = mini.id.base();
		let mut doc = self.base_doc(&id, KIND_MINI, base.object_id, base.index);
		self.add_language_copy(&mut doc, mini.language, &text);
		doc.add_text(self.fields.text, text);
		self.upsert(&id, doc)
	}

	fn submit_metadata(&self, meta: &MetadataSubmission<'_>) -> Result<(), SinkError> {
		let id = meta.object_id.to_string();
		let fields_json = serde_json::to_string(meta.fields).map_err(|e| SinkError::with_source("failed to encode metadata fields", e))?;
		let mut doc = self.base_doc(&id, KIND_PARENT, meta.object_id, 0);
		doc.add_u64(self.fields.num_chunks, u64::from(meta.num_chunks));
		doc.add_text(self.fields.file_name, meta.file_name);
		doc.add_text(self.fields.meta_json, fields_json);
		self.upsert(&id, doc)
	}

	fn flush_hint(&self) -> Result<(), SinkError> {
		self.commit().map(|_| ()).map_err(|e| SinkError::new(format!("commit failed: {:#}", e)))
	}
}
