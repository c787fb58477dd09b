//! Domain types shared by the chunking pipeline, the index backends and the
//! hit reconciler.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::Error;

/// Extra stored fields for a parent metadata document.
pub type Meta = HashMap<String, String>;

/// Separator between the parent object id and the chunk index.
pub const ID_CHUNK_SEP: char = '_';
/// Suffix marking the overlap-only auxiliary document of a chunk.
pub const MINI_CHUNK_SUFFIX: &str = "_mini";

/// Identity of one indexed chunk: `"<objectId>_<index>"`.
///
/// Index 0 is reserved for the parent metadata document, so chunk indices
/// start at 1 and grow by one per chunk of the same parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub object_id: i64,
    pub index: u32,
}

impl ChunkId {
    pub fn new(object_id: i64, index: u32) -> Self { Self { object_id, index } }

    pub fn mini(self) -> MiniChunkId { MiniChunkId(self) }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.object_id, ID_CHUNK_SEP, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidId(s.to_string());
        // Object ids can be negative, so split on the last separator.
        let (object, index) = s.rsplit_once(ID_CHUNK_SEP).ok_or_else(bad)?;
        let object_id = object.parse::<i64>().map_err(|_| bad())?;
        let index = index.parse::<u32>().map_err(|_| bad())?;
        if index == 0 { return Err(bad()); }
        Ok(Self { object_id, index })
    }
}

/// Identity of the mini-chunk that follows a non-final chunk: `"<chunkId>_mini"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiniChunkId(pub ChunkId);

impl MiniChunkId {
    pub fn base(&self) -> ChunkId { self.0 }
}

impl fmt::Display for MiniChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}{}", self.0, MINI_CHUNK_SUFFIX) }
}

/// Any id found in the index, classified by its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentId {
    Parent(i64),
    Chunk(ChunkId),
    MiniChunk(MiniChunkId),
}

impl DocumentId {
    pub fn object_id(&self) -> i64 {
        match self {
            Self::Parent(id) => *id,
            Self::Chunk(c) => c.object_id,
            Self::MiniChunk(m) => m.0.object_id,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent(id) => write!(f, "{}", id),
            Self::Chunk(c) => c.fmt(f),
            Self::MiniChunk(m) => m.fmt(f),
        }
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(base) = s.strip_suffix(MINI_CHUNK_SUFFIX) {
            return Ok(Self::MiniChunk(MiniChunkId(base.parse()?)));
        }
        if let Ok(parent) = s.parse::<i64>() { return Ok(Self::Parent(parent)); }
        Ok(Self::Chunk(s.parse()?))
    }
}

/// Where indexed text came from. Artifact-derived sources use negative ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    File,
    Artifact,
}

impl ContentOrigin {
    pub fn of(object_id: i64) -> Self { if object_id < 0 { Self::Artifact } else { Self::File } }
}

/// Languages that get a dedicated stemmed copy of the chunk text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    Russian,
}

impl Language {
    pub const ALL: [Language; 5] = [Self::English, Self::French, Self::German, Self::Spanish, Self::Russian];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::French => "fr",
            Self::German => "de",
            Self::Spanish => "es",
            Self::Russian => "ru",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.tag().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tag()) }
}

/// A searchable text field: the default content field or a language copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Default,
    Language(Language),
}

impl TextField {
    pub fn name(&self) -> String {
        match self {
            Self::Default => "text".to_string(),
            Self::Language(l) => format!("text_{}", l.tag()),
        }
    }

    pub fn is_language(&self) -> bool { matches!(self, Self::Language(_)) }
}

/// Target encoding for chunk bytes handed to the index sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        match self {
            Self::Utf8 => encoding_rs::UTF_8,
            Self::Utf16Le => encoding_rs::UTF_16LE,
            Self::Utf16Be => encoding_rs::UTF_16BE,
        }
    }

    /// Decodes sink bytes back to text, dropping the leading BOM.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _had_errors) = self.encoding().decode_with_bom_removal(bytes);
        text.into_owned()
    }
}

/// Identity of a source handed to the chunking pipeline.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub object_id: i64,
    pub name: String,
    pub fields: Meta,
}

impl SourceDocument {
    pub fn new(object_id: i64, name: impl Into<String>) -> Self {
        Self { object_id, name: name.into(), fields: Meta::new() }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A reconciled keyword hit.
///
/// Identity is `(object_id, chunk)`: two hits in the same chunk are the same
/// hit no matter which field or snippet produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordHit {
    pub object_id: i64,
    pub chunk: u32,
    pub matched_text: String,
    pub snippet: String,
    pub field: TextField,
}

impl KeywordHit {
    pub fn is_artifact_hit(&self) -> bool { ContentOrigin::of(self.object_id) == ContentOrigin::Artifact }

    fn key(&self) -> (i64, u32) { (self.object_id, self.chunk) }
}

impl PartialEq for KeywordHit {
    fn eq(&self, other: &Self) -> bool { self.key() == other.key() }
}

impl Eq for KeywordHit {}

impl Hash for KeywordHit {
    fn hash<H: Hasher>(&self, state: &mut H) { self.key().hash(state) }
}

impl PartialOrd for KeywordHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for KeywordHit {
    fn cmp(&self, other: &Self) -> Ordering { self.key().cmp(&other.key()) }
}
