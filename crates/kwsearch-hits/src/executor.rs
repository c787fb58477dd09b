use std::collections::BTreeMap;

use kwsearch_core::config::SearchSettings;
use kwsearch_core::error::QueryError;
use kwsearch_core::traits::{FieldQuery, SearchRequest, SearchService};
use kwsearch_core::types::{ChunkId, DocumentId, TextField};

/// Words that only carry meaning in the engine's query syntax.
const QUERY_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// What the user searches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub term: String,
    /// Match `term` as an exact phrase instead of parsing it as a query.
    pub literal: bool,
}

impl Keyword {
    pub fn literal(term: impl Into<String>) -> Self { Self { term: term.into(), literal: true } }

    pub fn query(term: impl Into<String>) -> Self { Self { term: term.into(), literal: false } }

    /// The term as the engine should see it.
    pub fn query_string(&self) -> String {
        if self.literal {
            // Quotes and backslashes are never part of a token, so dropping
            // them inside the phrase changes nothing that can match.
            format!("\"{}\"", self.term.replace(['"', '\\'], " ").trim())
        } else {
            self.term.clone()
        }
    }

    /// Units whose term frequencies are summed: the whole phrase for a
    /// literal, each bare word for a query.
    pub fn words(&self) -> Vec<String> {
        if self.literal {
            return vec![self.term.trim().to_string()];
        }
        self.term
            .split_whitespace()
            .filter(|w| !QUERY_OPERATORS.contains(w))
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }
}

/// Term frequencies and highlights of one returned document.
#[derive(Debug, Clone, Default)]
pub struct DocumentMatch {
    /// Occurrences in the default field; `None` if the engine could not say.
    pub default_tf: Option<u32>,
    /// Occurrences summed over all language fields.
    pub language_tf: u32,
    /// First language field with a non-zero count.
    pub language_field: Option<TextField>,
    pub highlights: BTreeMap<TextField, String>,
    /// Stored body, fetched only for chunks the engine did not highlight.
    pub stored_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryResults {
    pub keyword: Keyword,
    pub chunk_docs: BTreeMap<ChunkId, DocumentMatch>,
    /// Keyed by the chunk each mini-chunk follows.
    pub mini_chunk_docs: BTreeMap<ChunkId, DocumentMatch>,
}

/// Runs a keyword against the chunk index and collects everything the
/// reconciler needs.
pub struct HitQueryExecutor<'a> {
    service: &'a dyn SearchService,
    result_limit: usize,
    snippet_chars: usize,
}

impl<'a> HitQueryExecutor<'a> {
    pub fn new(service: &'a dyn SearchService) -> Self { Self::from_settings(service, &SearchSettings::default()) }

    pub fn from_settings(service: &'a dyn SearchService, settings: &SearchSettings) -> Self {
        Self { service, result_limit: settings.result_limit, snippet_chars: settings.snippet_chars }
    }

    pub fn query(&self, keyword: &Keyword) -> Result<QueryResults, QueryError> {
        if keyword.term.trim().is_empty() {
            return Err(QueryError::Validation("empty search term".into()));
        }
        let words = keyword.words();
        if words.is_empty() {
            return Err(QueryError::Validation(format!("'{}' contains no searchable word", keyword.term)));
        }
        if self.service.indexed_document_count()? == 0 {
            return Err(QueryError::NoIndexedContent);
        }

        let language_fields = self.service.language_fields();
        let query = keyword.query_string();
        let clauses = std::iter::once(TextField::Default)
            .chain(language_fields.iter().copied())
            .map(|field| FieldQuery { field, query: query.clone() })
            .collect();
        let request = SearchRequest { clauses, limit: self.result_limit, snippet_chars: self.snippet_chars };
        let docs = self.service.search(&request)?;
        tracing::debug!(term = %keyword.term, docs = docs.len(), "keyword query returned");

        let mut results = QueryResults { keyword: keyword.clone(), chunk_docs: BTreeMap::new(), mini_chunk_docs: BTreeMap::new() };
        for doc in docs {
            let parsed = match doc.id.parse::<DocumentId>() {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "skipping document with unparseable id");
                    continue;
                }
            };
            let (chunk, is_mini) = match parsed {
                DocumentId::Parent(_) => continue,
                DocumentId::Chunk(id) => (id, false),
                DocumentId::MiniChunk(id) => (id.base(), true),
            };

            let mut found = DocumentMatch { highlights: doc.highlights, ..DocumentMatch::default() };
            found.default_tf = self.frequency(TextField::Default, &words, &doc.id)?;
            for field in &language_fields {
                let tf = self.frequency(*field, &words, &doc.id)?.unwrap_or(0);
                if tf > 0 && found.language_field.is_none() {
                    found.language_field = Some(*field);
                }
                found.language_tf += tf;
            }

            if is_mini {
                results.mini_chunk_docs.insert(chunk, found);
            } else {
                if found.highlights.is_empty() {
                    found.stored_text = self.service.stored_text(&doc.id, TextField::Default)?;
                }
                results.chunk_docs.insert(chunk, found);
            }
        }
        Ok(results)
    }

    fn frequency(&self, field: TextField, words: &[String], doc_id: &str) -> Result<Option<u32>, QueryError> {
        let mut total = 0;
        for word in words {
            match self.service.term_frequency(field, word, doc_id)? {
                Some(tf) => total += tf,
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }
}
