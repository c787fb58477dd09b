//! kwsearch-text
//!
//! Tantivy schema and analyzers for chunk, mini-chunk and parent documents.
//! Every chunk is indexed once in the default `text` field and, when it has a
//! language, once more in the stemmed `text_<tag>` field.
use std::collections::BTreeMap;

use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use kwsearch_core::types::{Language, TextField};

pub const TEXT_TOKENIZER: &str = "text_with_stopwords";

pub const KIND_PARENT: &str = "parent";
pub const KIND_CHUNK: &str = "chunk";
pub const KIND_MINI: &str = "mini";

/// Resolved handles of every schema field.
#[derive(Debug, Clone)]
pub struct Fields {
	pub id: Field,
	pub kind: Field,
	pub object_id: Field,
	pub chunk_index: Field,
	pub num_chunks: Field,
	pub chunk_size: Field,
	pub file_name: Field,
	pub meta_json: Field,
	pub language: Field,
	pub text: Field,
	pub stemmed: BTreeMap<Language, Field>,
}

impl Fields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		let mut stemmed = BTreeMap::new();
		for lang in Language::ALL {
			stemmed.insert(lang, schema.get_field(&TextField::Language(lang).name())?);
		}
		Ok(Self {
			id: schema.get_field("id")?,
			kind: schema.get_field("kind")?,
			object_id: schema.get_field("object_id")?,
			chunk_index: schema.get_field("chunk_index")?,
			num_chunks: schema.get_field("num_chunks")?,
			chunk_size: schema.get_field("chunk_size")?,
			file_name: schema.get_field("file_name")?,
			meta_json: schema.get_field("meta_json")?,
			language: schema.get_field("language")?,
			text: schema.get_field(&TextField::Default.name())?,
			stemmed,
		})
	}

	pub fn text_field(&self, field: TextField) -> Option<Field> {
		match field {
			TextField::Default => Some(self.text),
			TextField::Language(lang) => self.stemmed.get(&lang).copied(),
		}
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("kind", STRING | STORED);
	schema_builder.add_i64_field("object_id", INDEXED | STORED);
	schema_builder.add_u64_field("chunk_index", INDEXED | STORED);
	schema_builder.add_u64_field("num_chunks", STORED);
	schema_builder.add_u64_field("chunk_size", STORED);
	schema_builder.add_text_field("file_name", STRING | STORED);
	schema_builder.add_text_field("meta_json", STORED);
	schema_builder.add_text_field("language", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TEXT_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field(&TextField::Default.name(), text_options);
	// Language copies are indexed only; snippets are cut from the stored default text.
	for lang in Language::ALL {
		let indexing = TextFieldIndexing::default().set_tokenizer(&stem_tokenizer_name(lang)).set_index_option(IndexRecordOption::WithFreqsAndPositions);
		schema_builder.add_text_field(&TextField::Language(lang).name(), TextOptions::default().set_indexing_options(indexing));
	}
	schema_builder.build()
}

pub fn stem_tokenizer_name(lang: Language) -> String { format!("stem_{}", lang.tag()) }

fn stemmer_language(lang: Language) -> tantivy::tokenizer::Language {
	match lang {
		Language::English => tantivy::tokenizer::Language::English,
		Language::French => tantivy::tokenizer::Language::French,
		Language::German => tantivy::tokenizer::Language::German,
		Language::Spanish => tantivy::tokenizer::Language::Spanish,
		Language::Russian => tantivy::tokenizer::Language::Russian,
	}
}

pub fn register_tokenizers(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TEXT_TOKENIZER, tokenizer);
	for lang in Language::ALL {
		let stemming = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(RemoveLongFilter::limit(40))
			.filter(LowerCaser)
			.filter(Stemmer::new(stemmer_language(lang)))
			.build();
		index.tokenizers().register(&stem_tokenizer_name(lang), stemming);
	}
}
