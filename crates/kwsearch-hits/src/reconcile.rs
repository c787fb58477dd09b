//! Turns raw chunk and mini-chunk matches into the final hit list.
//!
//! The indexed text of chunk N ends with the head of chunk N+1, and the
//! mini-chunk of N holds exactly that head. If chunk N has no more
//! occurrences than its mini-chunk, every occurrence sits in the overlap and
//! chunk N+1 reports it. Otherwise chunk N has an occurrence of its own. A
//! chunk with both kinds still yields one hit.

use kwsearch_core::types::{KeywordHit, TextField};

use crate::executor::{DocumentMatch, QueryResults};
use crate::highlight::Highlighter;

#[derive(Debug, Clone, Copy)]
pub struct HitReconciler {
    snippet_chars: usize,
}

impl Default for HitReconciler {
    fn default() -> Self { Self { snippet_chars: 150 } }
}

impl HitReconciler {
    pub fn new(snippet_chars: usize) -> Self { Self { snippet_chars } }

    /// Hits ordered by `(object_id, chunk)`, one per chunk.
    pub fn reconcile(&self, results: &QueryResults) -> Vec<KeywordHit> {
        let highlighter = Highlighter::new(&results.keyword.words());
        let mut hits = Vec::with_capacity(results.chunk_docs.len());

        for (id, chunk) in &results.chunk_docs {
            let mini = results.mini_chunk_docs.get(id);
            let chunk_tf = default_tf(chunk, &id.to_string());
            let report_default = chunk_tf > 0
                && mini.map_or(true, |m| default_tf(m, &id.mini().to_string()) < chunk_tf);
            let report_language = chunk.language_tf > 0 && mini.map_or(true, |m| m.language_tf < chunk.language_tf);
            if !(report_default || report_language) {
                tracing::trace!(chunk = %id, "occurrences only in overlap, left to the next chunk");
                continue;
            }

            let field = match chunk.language_field {
                Some(field) if report_language => field,
                _ => TextField::Default,
            };
            hits.push(KeywordHit {
                object_id: id.object_id,
                chunk: id.index,
                matched_text: results.keyword.term.clone(),
                snippet: self.snippet(chunk, highlighter.as_ref()),
                field,
            });
        }

        hits.sort();
        hits.dedup();
        hits
    }

    fn snippet(&self, chunk: &DocumentMatch, highlighter: Option<&Highlighter>) -> String {
        let language = chunk.highlights.iter().find(|(field, _)| field.is_language()).map(|(_, s)| s);
        if let Some(snippet) = language.or_else(|| chunk.highlights.get(&TextField::Default)) {
            return snippet.clone();
        }
        match (highlighter, chunk.stored_text.as_deref()) {
            (Some(h), Some(text)) => h.snippet(text, self.snippet_chars).unwrap_or_default(),
            _ => String::new(),
        }
    }
}

fn default_tf(found: &DocumentMatch, id: &str) -> u32 {
    found.default_tf.unwrap_or_else(|| {
        tracing::warn!(id, "no default-field term frequency, counting it as zero");
        0
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kwsearch_core::types::{ChunkId, Language};

    use super::*;
    use crate::executor::Keyword;

    fn found(default_tf: u32, language_tf: u32) -> DocumentMatch {
        DocumentMatch { default_tf: Some(default_tf), language_tf, ..DocumentMatch::default() }
    }

    fn results(chunks: Vec<(ChunkId, DocumentMatch)>, minis: Vec<(ChunkId, DocumentMatch)>) -> QueryResults {
        QueryResults {
            keyword: Keyword::literal("needle"),
            chunk_docs: chunks.into_iter().collect(),
            mini_chunk_docs: minis.into_iter().collect(),
        }
    }

    fn reported(results: &QueryResults) -> Vec<(i64, u32)> {
        HitReconciler::default().reconcile(results).iter().map(|h| (h.object_id, h.chunk)).collect()
    }

    #[test]
    fn overlap_only_occurrence_is_left_to_next_chunk() {
        let r = results(vec![(ChunkId::new(1, 1), found(1, 0)), (ChunkId::new(1, 2), found(1, 0))], vec![(ChunkId::new(1, 1), found(1, 0))]);
        assert_eq!(reported(&r), vec![(1, 2)]);
    }

    #[test]
    fn core_occurrence_is_reported_alongside_overlap() {
        let r = results(vec![(ChunkId::new(1, 1), found(2, 0)), (ChunkId::new(1, 2), found(1, 0))], vec![(ChunkId::new(1, 1), found(1, 0))]);
        assert_eq!(reported(&r), vec![(1, 1), (1, 2)]);
    }

    #[test]
    fn chunk_without_mini_is_reported() {
        let r = results(vec![(ChunkId::new(3, 4), found(1, 0))], vec![]);
        assert_eq!(reported(&r), vec![(3, 4)]);
    }

    #[test]
    fn language_only_match_is_reported_once_with_language_snippet() {
        let mut chunk = found(0, 1);
        chunk.language_field = Some(TextField::Language(Language::English));
        chunk.highlights.insert(TextField::Language(Language::English), "she <b>runs</b>".into());
        let r = results(vec![(ChunkId::new(2, 1), chunk)], vec![]);
        let hits = HitReconciler::default().reconcile(&r);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "she <b>runs</b>");
        assert_eq!(hits[0].field, TextField::Language(Language::English));
    }

    #[test]
    fn language_overlap_is_judged_separately() {
        let r = results(vec![(ChunkId::new(1, 1), found(1, 2))], vec![(ChunkId::new(1, 1), found(1, 1))]);
        let hits = HitReconciler::default().reconcile(&r);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].field, TextField::Default);
    }

    #[test]
    fn missing_default_tf_counts_as_zero() {
        let chunk = DocumentMatch { default_tf: None, ..DocumentMatch::default() };
        let r = results(vec![(ChunkId::new(1, 1), chunk)], vec![]);
        assert!(reported(&r).is_empty());
    }

    #[test]
    fn mini_without_default_tf_counts_as_zero() {
        let mini = DocumentMatch { default_tf: None, ..DocumentMatch::default() };
        let r = results(vec![(ChunkId::new(1, 1), found(1, 0))], vec![(ChunkId::new(1, 1), mini)]);
        assert_eq!(reported(&r), vec![(1, 1)]);
    }

    #[test]
    fn snippet_prefers_language_then_default_then_manual() {
        let mut both = found(1, 1);
        both.highlights = BTreeMap::from([
            (TextField::Default, "default".to_string()),
            (TextField::Language(Language::German), "german".to_string()),
        ]);
        let mut manual = found(1, 0);
        manual.stored_text = Some("a needle & thread".into());
        let r = results(vec![(ChunkId::new(1, 1), both), (ChunkId::new(1, 2), manual)], vec![]);
        let hits = HitReconciler::default().reconcile(&r);
        assert_eq!(hits[0].snippet, "german");
        assert_eq!(hits[1].snippet, "a <b>needle</b> &amp; thread");
    }

    #[test]
    fn output_is_sorted_by_object_and_chunk() {
        let r = results(
            vec![(ChunkId::new(-2, 1), found(1, 0)), (ChunkId::new(5, 10), found(1, 0)), (ChunkId::new(5, 2), found(1, 0))],
            vec![],
        );
        assert_eq!(reported(&r), vec![(-2, 1), (5, 2), (5, 10)]);
    }
}
