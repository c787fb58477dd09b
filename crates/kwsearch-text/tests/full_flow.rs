use kwsearch_core::traits::{FieldQuery, FixedLanguage, NeverCancel, SearchRequest, SearchService};
use kwsearch_core::types::{Language, TextField};
use kwsearch_core::{ChunkLimits, ChunkingPipeline, SourceDocument, StrSource};
use kwsearch_text::{IndexStats, TantivyIndexer, TantivySearchEngine};
use tempfile::TempDir;

fn limits() -> ChunkLimits {
    ChunkLimits { max_chunk_chars: 60, single_read_chars: 10, extra_margin_chars: 5, overlap_chars: 8 }
}

fn request(field: TextField, query: &str) -> SearchRequest {
    SearchRequest { clauses: vec![FieldQuery { field, query: query.to_string() }], limit: 100, snippet_chars: 80 }
}

fn ids(engine: &TantivySearchEngine, req: &SearchRequest) -> Vec<String> {
    let mut ids: Vec<String> = engine.search(req).unwrap().into_iter().map(|d| d.id).collect();
    ids.sort();
    ids
}

const TEXT: &str = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima mike \
november oscar papa quebec romeo sierra tango uniform victor whiskey xray yankee zulu";

#[test]
fn tantivy_full_flow() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("idx");
    let indexer = TantivyIndexer::new(index_dir.clone()).expect("indexer");
    let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
    let doc = SourceDocument::new(11, "phonetic.txt").with_field("author", "nato");
    let outcome = pipeline.process(&doc, &mut StrSource::new(TEXT), &NeverCancel).expect("process");
    assert!(outcome.chunks() >= 2);
    indexer.commit().unwrap();

    let engine = TantivySearchEngine::new(index_dir).expect("engine");
    let stats = engine.stats().unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.chunks, u64::from(outcome.chunks()));
    assert_eq!(stats.mini_chunks, u64::from(outcome.chunks() - 1));
    assert_eq!(engine.indexed_document_count().unwrap(), stats.files + stats.chunks + stats.mini_chunks);

    assert_eq!(ids(&engine, &request(TextField::Default, "alpha")), vec!["11_1"]);
    // The last word also sits in the overlap window of the chunk before it.
    let n = outcome.chunks();
    let zulu = ids(&engine, &request(TextField::Default, "zulu"));
    assert_eq!(zulu, vec![format!("11_{}", n - 1), format!("11_{}_mini", n - 1), format!("11_{}", n)]);

    let parent = engine.parent_info(11).unwrap().expect("parent");
    assert_eq!(parent.num_chunks, u64::from(outcome.chunks()));
    assert_eq!(parent.file_name, "phonetic.txt");
    assert_eq!(parent.fields.get("author").map(String::as_str), Some("nato"));
}

#[test]
fn chunk_documents_carry_the_overlap_window() {
    let indexer = TantivyIndexer::create_in_ram().unwrap();
    let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
    pipeline.process(&SourceDocument::new(2, "w"), &mut StrSource::new(TEXT), &NeverCancel).unwrap();
    indexer.commit().unwrap();
    let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();

    let body2 = engine.stored_text("2_2", TextField::Default).unwrap().expect("chunk 2");
    let first_word = body2.split_whitespace().next().unwrap().to_string();
    let hits = ids(&engine, &request(TextField::Default, &first_word));
    assert_eq!(hits, vec!["2_1".to_string(), "2_1_mini".to_string(), "2_2".to_string()]);

    assert_eq!(engine.term_frequency(TextField::Default, &first_word, "2_1").unwrap(), Some(1));
    assert_eq!(engine.term_frequency(TextField::Default, &first_word, "2_1_mini").unwrap(), Some(1));
    assert_eq!(engine.term_frequency(TextField::Default, &first_word, "404_1").unwrap(), None);
}

#[test]
fn chunk_snippet_is_taken_from_its_own_body() {
	let indexer = TantivyIndexer::create_in_ram().unwrap();
	let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
	// Chunk 1 holds one "zebra"; its window repeats the two that open chunk 2.
	let text = "zebra alpha bravo charlie delta echo foxtrot golf zebra zebra kilo lima mike november";
	pipeline.process(&SourceDocument::new(4, "z"), &mut StrSource::new(text), &NeverCancel).unwrap();
	indexer.commit().unwrap();
	let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();

	let body = engine.stored_text("4_1", TextField::Default).unwrap().expect("chunk 1");
	assert_eq!(body, "zebra alpha bravo charlie delta echo foxtrot golf ");
	let req = SearchRequest { snippet_chars: 20, ..request(TextField::Default, "zebra") };
	let docs = engine.search(&req).unwrap();
	let chunk1 = docs.iter().find(|d| d.id == "4_1").expect("chunk 1 matches");
	let snippet = &chunk1.highlights[&TextField::Default];
	assert!(snippet.contains("<b>zebra</b>"));
	assert!(body.contains(&snippet.replace("<b>", "").replace("</b>", "")), "snippet {snippet:?} is outside the body");
}

#[test]
fn term_frequency_counts_words_and_phrases() {
    let indexer = TantivyIndexer::create_in_ram().unwrap();
    let mut pipeline = ChunkingPipeline::new(&indexer, ChunkLimits::default()).unwrap();
    let text = "red fox, blue fox. Red fox again; the red car and the fox";
    pipeline.process(&SourceDocument::new(1, "f"), &mut StrSource::new(text), &NeverCancel).unwrap();
    indexer.commit().unwrap();
    let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();

    assert_eq!(engine.term_frequency(TextField::Default, "fox", "1_1").unwrap(), Some(4));
    assert_eq!(engine.term_frequency(TextField::Default, "red fox", "1_1").unwrap(), Some(2));
    assert_eq!(engine.term_frequency(TextField::Default, "green", "1_1").unwrap(), Some(0));
    assert_eq!(engine.stored_text("1_1", TextField::Default).unwrap().as_deref(), Some(text));
}

#[test]
fn language_copy_matches_inflections() {
    let indexer = TantivyIndexer::create_in_ram().unwrap();
    let mut pipeline = ChunkingPipeline::new(&indexer, ChunkLimits::default()).unwrap()
        .with_language_tagger(Box::new(FixedLanguage(Language::English)));
    pipeline.process(&SourceDocument::new(3, "l"), &mut StrSource::new("she runs every morning"), &NeverCancel).unwrap();
    indexer.commit().unwrap();
    let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();

    assert!(ids(&engine, &request(TextField::Default, "running")).is_empty());
    let docs = engine.search(&request(TextField::Language(Language::English), "running")).unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].highlights[&TextField::Language(Language::English)].contains("<b>runs</b>"));
    assert_eq!(engine.term_frequency(TextField::Language(Language::English), "running", "3_1").unwrap(), Some(1));
    assert!(engine.stored_text("3_1", TextField::Language(Language::German)).unwrap().is_none());
}

#[test]
fn resubmitting_a_document_replaces_it() {
    let tmp = TempDir::new().unwrap();
    let indexer = TantivyIndexer::open_or_create(tmp.path()).unwrap();
    for _ in 0..2 {
        let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
        pipeline.process(&SourceDocument::new(5, "again"), &mut StrSource::new(TEXT), &NeverCancel).unwrap();
        indexer.commit().unwrap();
    }
    let engine = TantivySearchEngine::new(tmp.path().to_path_buf()).unwrap();
    assert_eq!(engine.stats().unwrap().files, 1);
    assert_eq!(ids(&engine, &request(TextField::Default, "alpha")), vec!["5_1"]);
}

#[test]
fn reingesting_shorter_text_drops_stale_chunks() {
	let indexer = TantivyIndexer::create_in_ram().unwrap();
	let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
	let first = pipeline.process(&SourceDocument::new(5, "v1.txt"), &mut StrSource::new(TEXT), &NeverCancel).unwrap();
	assert!(first.chunks() >= 3);
	pipeline.process(&SourceDocument::new(6, "other.txt"), &mut StrSource::new(TEXT), &NeverCancel).unwrap();
	indexer.commit().unwrap();

	pipeline.process(&SourceDocument::new(5, "v2.txt"), &mut StrSource::new("short needle doc"), &NeverCancel).unwrap();
	indexer.commit().unwrap();
	let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();

	let stats = engine.stats().unwrap();
	assert_eq!(stats, IndexStats { files: 2, chunks: first.chunks() as u64 + 1, mini_chunks: first.chunks() as u64 - 1 });
	assert_eq!(ids(&engine, &request(TextField::Default, "needle")), vec!["5_1"]);
	assert_eq!(ids(&engine, &request(TextField::Default, "alpha")), vec!["6_1"]);
	assert!(engine.stored_text("5_2", TextField::Default).unwrap().is_none());
	assert_eq!(engine.parent_info(5).unwrap().expect("parent").num_chunks, 1);
}

#[test]
fn pruning_removes_objects_beyond_the_last_id() {
	let indexer = TantivyIndexer::create_in_ram().unwrap();
	let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
	for object_id in 1..=3 {
		pipeline.process(&SourceDocument::new(object_id, "p"), &mut StrSource::new(TEXT), &NeverCancel).unwrap();
	}
	indexer.commit().unwrap();

	assert_eq!(indexer.prune_objects_above(1).unwrap(), 2);
	indexer.commit().unwrap();
	let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();
	assert_eq!(engine.stats().unwrap().files, 1);
	assert_eq!(ids(&engine, &request(TextField::Default, "alpha")), vec!["1_1"]);
	assert_eq!(indexer.prune_objects_above(1).unwrap(), 0);
}

#[test]
fn invalid_query_is_a_validation_error() {
    let indexer = TantivyIndexer::create_in_ram().unwrap();
    let mut pipeline = ChunkingPipeline::new(&indexer, limits()).unwrap();
    pipeline.process(&SourceDocument::new(1, "q"), &mut StrSource::new("some words"), &NeverCancel).unwrap();
    indexer.commit().unwrap();
    let engine = TantivySearchEngine::from_index(indexer.index().clone()).unwrap();
    let err = engine.search(&request(TextField::Default, "nosuchfield:foo")).unwrap_err();
    assert!(!err.is_retryable());
}
