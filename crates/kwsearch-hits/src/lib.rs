//! kwsearch-hits
//!
//! Keyword hits over chunked documents: query every chunk and mini-chunk,
//! then reconcile overlap matches so that each occurrence is reported once.
pub mod executor;
pub mod highlight;
pub mod reconcile;

pub use executor::{DocumentMatch, HitQueryExecutor, Keyword, QueryResults};
pub use highlight::Highlighter;
pub use reconcile::HitReconciler;

use kwsearch_core::config::SearchSettings;
use kwsearch_core::error::QueryError;
use kwsearch_core::traits::SearchService;
use kwsearch_core::types::KeywordHit;

/// Query and reconcile in one step.
pub fn find_hits(service: &dyn SearchService, keyword: &Keyword, settings: &SearchSettings) -> Result<Vec<KeywordHit>, QueryError> {
    let results = HitQueryExecutor::from_settings(service, settings).query(keyword)?;
    let hits = HitReconciler::new(settings.snippet_chars).reconcile(&results);
    tracing::info!(term = %keyword.term, chunks = results.chunk_docs.len(), hits = hits.len(), "keyword search finished");
    Ok(hits)
}
