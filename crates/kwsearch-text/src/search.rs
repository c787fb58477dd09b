use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use tantivy::collector::{Count, TopDocs};
use tantivy::postings::Postings;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::snippet::SnippetGenerator;
use tantivy::{DocAddress, DocSet, Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument, TantivyError, Term, TERMINATED};

use kwsearch_core::error::QueryError;
use kwsearch_core::traits::{SearchDocument, SearchRequest, SearchService};
use kwsearch_core::types::{Language, Meta, TextField};

use crate::tantivy_utils::{register_tokenizers, Fields, KIND_CHUNK, KIND_MINI, KIND_PARENT};

/// Document counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
	pub files: u64,
	pub chunks: u64,
	pub mini_chunks: u64,
}

/// Stored fields of a parent metadata document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ParentInfo {
	pub object_id: i64,
	pub num_chunks: u64,
	pub file_name: String,
	pub fields: Meta,
}

/// Tantivy-backed [`SearchService`].
///
/// The reader reloads only on [`TantivySearchEngine::reload`], so one query
/// sees one consistent commit.
pub struct TantivySearchEngine {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	languages: Vec<Language>,
}

fn transport(context: &'static str) -> impl FnOnce(TantivyError) -> QueryError {
	move |e| QueryError::transport(context, e)
}

impl TantivySearchEngine {
	pub fn new(index_dir: std::path::PathBuf) -> Result<Self, anyhow::Error> {
		let index = Index::open_in_dir(&index_dir)?;
		Self::from_index(index)
	}

	pub fn from_index(index: Index) -> Result<Self, anyhow::Error> {
		register_tokenizers(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields, languages: Language::ALL.to_vec() })
	}

	/// Restricts the language fields that queries go through.
	pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
		self.languages = languages;
		self
	}

	/// Picks up the latest commit.
	pub fn reload(&self) -> Result<(), anyhow::Error> {
		self.reader.reload()?;
		Ok(())
	}

	pub fn stats(&self) -> Result<IndexStats, QueryError> {
		let searcher = self.reader.searcher();
		Ok(IndexStats {
			files: self.count_kind(&searcher, KIND_PARENT)?,
			chunks: self.count_kind(&searcher, KIND_CHUNK)?,
			mini_chunks: self.count_kind(&searcher, KIND_MINI)?,
		})
	}

	pub fn parent_info(&self, object_id: i64) -> Result<Option<ParentInfo>, QueryError> {
		let searcher = self.reader.searcher();
		let Some(addr) = self.find_doc(&searcher, &object_id.to_string())? else { return Ok(None) };
		let doc: TantivyDocument = searcher.doc(addr).map_err(transport("failed to load parent document"))?;
		let fields = match doc.get_first(self.fields.meta_json).and_then(|v| v.as_str()) {
			Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
				tracing::warn!(object_id, error = %e, "unreadable metadata fields");
				Meta::new()
			}),
			None => Meta::new(),
		};
		Ok(Some(ParentInfo {
			object_id,
			num_chunks: doc.get_first(self.fields.num_chunks).and_then(|v| v.as_u64()).unwrap_or(0),
			file_name: doc.get_first(self.fields.file_name).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
			fields,
		}))
	}

	fn count_kind(&self, searcher: &Searcher, kind: &str) -> Result<u64, QueryError> {
		let query = TermQuery::new(Term::from_field_text(self.fields.kind, kind), IndexRecordOption::Basic);
		let n = searcher.search(&query, &Count).map_err(transport("failed to count documents"))?;
		Ok(n as u64)
	}

	fn find_doc(&self, searcher: &Searcher, doc_id: &str) -> Result<Option<DocAddress>, QueryError> {
		let query = TermQuery::new(Term::from_field_text(self.fields.id, doc_id), IndexRecordOption::Basic);
		let top = searcher.search(&query, &TopDocs::with_limit(1)).map_err(transport("id lookup failed"))?;
		Ok(top.first().map(|(_, addr)| *addr))
	}

	/// Analyzed tokens of `text` for `field`, with positions relative to the first one.
	fn analyze(&self, field: Field, text: &str) -> Result<Vec<(u32, Term)>, QueryError> {
		let mut analyzer = self.index.tokenizer_for_field(field).map_err(transport("no tokenizer for field"))?;
		let mut tokens = Vec::new();
		analyzer.token_stream(text).process(&mut |t| tokens.push((t.position as u32, Term::from_field_text(field, &t.text))));
		if let Some(first) = tokens.first().map(|(p, _)| *p) {
			for (p, _) in tokens.iter_mut() { *p -= first; }
		}
		Ok(tokens)
	}

	/// Occurrences of the analyzed phrase in one document of one segment.
	fn count_in_doc(&self, searcher: &Searcher, addr: DocAddress, field: Field, tokens: &[(u32, Term)]) -> Result<u32, QueryError> {
		let segment = searcher.segment_reader(addr.segment_ord);
		let inverted = segment.inverted_index(field).map_err(transport("failed to open inverted index"))?;
		let option = if tokens.len() == 1 { IndexRecordOption::WithFreqs } else { IndexRecordOption::WithFreqsAndPositions };

		let mut positions: Vec<(u32, HashSet<u32>)> = Vec::with_capacity(tokens.len());
		for (offset, term) in tokens {
			let postings = inverted.read_postings(term, option).map_err(|e| QueryError::transport("failed to read postings", e))?;
			let Some(mut postings) = postings else { return Ok(0) };
			let mut doc = postings.doc();
			if doc < addr.doc_id { doc = postings.seek(addr.doc_id); }
			if doc == TERMINATED || doc != addr.doc_id { return Ok(0); }
			if tokens.len() == 1 { return Ok(postings.term_freq()); }
			let mut buf = Vec::new();
			postings.positions(&mut buf);
			positions.push((*offset, buf.into_iter().collect()));
		}

		let Some(((_, first), rest)) = positions.split_first() else { return Ok(0) };
		let hits = first.iter().filter(|start| rest.iter().all(|(offset, set)| set.contains(&(**start + offset)))).count();
		Ok(hits as u32)
	}
}

impl SearchService for TantivySearchEngine {
	fn search(&self, request: &SearchRequest) -> Result<Vec<SearchDocument>, QueryError> {
		if request.clauses.is_empty() { return Err(QueryError::Validation("no fields to search".into())); }
		let searcher = self.reader.searcher();

		let mut per_field: Vec<(TextField, Field, Box<dyn Query>)> = Vec::with_capacity(request.clauses.len());
		for clause in &request.clauses {
			let field = self.fields.text_field(clause.field).ok_or_else(|| QueryError::Validation(format!("unknown field {}", clause.field.name())))?;
			let parser = QueryParser::for_index(&self.index, vec![field]);
			let query = parser.parse_query(&clause.query).map_err(|e| QueryError::Validation(e.to_string()))?;
			per_field.push((clause.field, field, query));
		}
		let query = BooleanQuery::new(per_field.iter().map(|(_, _, q)| (Occur::Should, q.box_clone())).collect());
		let top_docs = searcher.search(&query, &TopDocs::with_limit(request.limit.max(1))).map_err(transport("search failed"))?;

		let mut generators = Vec::with_capacity(per_field.len());
		for (text_field, field, q) in &per_field {
			let mut generator = SnippetGenerator::create(&searcher, q.as_ref(), *field).map_err(transport("failed to prepare snippets"))?;
			generator.set_max_num_chars(request.snippet_chars);
			generators.push((*text_field, generator));
		}

		let mut results = Vec::with_capacity(top_docs.len());
		for (_score, doc_address) in top_docs {
			let doc: TantivyDocument = searcher.doc(doc_address).map_err(transport("failed to load document"))?;
			let Some(id) = doc.get_first(self.fields.id).and_then(|v| v.as_str()) else { continue };
			let text = doc.get_first(self.fields.text).and_then(|v| v.as_str()).unwrap_or_default();
			// A chunk's own body comes first; its window belongs to the next chunk.
			let body: Option<String> = doc.get_first(self.fields.chunk_size).and_then(|v| v.as_u64()).map(|n| text.chars().take(n as usize).collect());
			let mut highlights = BTreeMap::new();
			for (text_field, generator) in &generators {
				let mut snippet = generator.snippet(body.as_deref().unwrap_or(text));
				if snippet.highlighted().is_empty() && body.is_some() { snippet = generator.snippet(text); }
				if !snippet.highlighted().is_empty() { highlights.insert(*text_field, snippet.to_html()); }
			}
			results.push(SearchDocument { id: id.to_string(), highlights });
		}
		Ok(results)
	}

	fn term_frequency(&self, field: TextField, term: &str, doc_id: &str) -> Result<Option<u32>, QueryError> {
		let Some(tfield) = self.fields.text_field(field) else { return Ok(None) };
		let searcher = self.reader.searcher();
		let Some(addr) = self.find_doc(&searcher, doc_id)? else { return Ok(None) };
		let tokens = self.analyze(tfield, term)?;
		if tokens.is_empty() { return Ok(Some(0)); }
		self.count_in_doc(&searcher, addr, tfield, &tokens).map(Some)
	}

	fn language_fields(&self) -> Vec<TextField> { self.languages.iter().map(|l| TextField::Language(*l)).collect() }

	fn indexed_document_count(&self) -> Result<u64, QueryError> { Ok(self.reader.searcher().num_docs()) }

	fn stored_text(&self, doc_id: &str, field: TextField) -> Result<Option<String>, QueryError> {
		let searcher = self.reader.searcher();
		let Some(addr) = self.find_doc(&searcher, doc_id)? else { return Ok(None) };
		let doc: TantivyDocument = searcher.doc(addr).map_err(transport("failed to load document"))?;
		if let TextField::Language(lang) = field {
			// Language copies are not stored; they exist only for tagged documents.
			if doc.get_first(self.fields.language).and_then(|v| v.as_str()) != Some(lang.tag()) { return Ok(None); }
		}
		let Some(text) = doc.get_first(self.fields.text).and_then(|v| v.as_str()) else { return Ok(None) };
		let body = match doc.get_first(self.fields.chunk_size).and_then(|v| v.as_u64()) {
			Some(n) => text.chars().take(n as usize).collect(),
			None => text.to_string(),
		};
		Ok(Some(body))
	}
}
