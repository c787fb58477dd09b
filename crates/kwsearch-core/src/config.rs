//! Lightweight configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Missing sections fall back to the defaults of the typed settings.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunker::ChunkLimits;
use crate::error::Error;
use crate::pipeline::FlushPolicy;
use crate::types::{Charset, Language};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from an explicit figment, e.g. a TOML string in tests.
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// A typed section; a missing section yields its defaults and missing
    /// keys inside a section fall back through `#[serde(default)]`.
    pub fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.figment.find_value(key) {
            Ok(_) => self.get(key),
            Err(_) => Ok(T::default()),
        }
    }

    pub fn chunking(&self) -> anyhow::Result<ChunkingSettings> { self.section("chunking") }

    pub fn search(&self) -> anyhow::Result<SearchSettings> { self.section("search") }

    pub fn data(&self) -> anyhow::Result<DataSettings> { self.section("data") }

    fn validate(&self) -> anyhow::Result<()> {
        self.chunking()?.limits().validate()?;
        let search = self.search()?;
        if search.result_limit == 0 {
            return Err(Error::InvalidConfig("search.result_limit must be positive".into()).into());
        }
        if search.snippet_chars == 0 {
            return Err(Error::InvalidConfig("search.snippet_chars must be positive".into()).into());
        }
        Ok(())
    }
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_chunk_chars: usize,
    pub single_read_chars: usize,
    pub extra_margin_chars: usize,
    pub overlap_chars: usize,
    pub charset: Charset,
    /// Fallback encoding label for sources without a BOM (WHATWG label).
    pub source_encoding: String,
    /// Language copied into a language field for every chunk, if any.
    pub language: Option<Language>,
    pub flush_every_chunks: Option<u32>,
    pub flush_interval_ms: Option<u64>,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let limits = ChunkLimits::default();
        Self {
            max_chunk_chars: limits.max_chunk_chars,
            single_read_chars: limits.single_read_chars,
            extra_margin_chars: limits.extra_margin_chars,
            overlap_chars: limits.overlap_chars,
            charset: Charset::Utf8,
            source_encoding: "utf-8".to_string(),
            language: None,
            flush_every_chunks: None,
            flush_interval_ms: Some(300_000),
        }
    }
}

impl ChunkingSettings {
    pub fn limits(&self) -> ChunkLimits {
        ChunkLimits {
            max_chunk_chars: self.max_chunk_chars,
            single_read_chars: self.single_read_chars,
            extra_margin_chars: self.extra_margin_chars,
            overlap_chars: self.overlap_chars,
        }
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy { every_chunks: self.flush_every_chunks, interval: self.flush_interval_ms.map(Duration::from_millis) }
    }

    pub fn source_encoding(&self) -> Result<&'static encoding_rs::Encoding, Error> {
        encoding_rs::Encoding::for_label(self.source_encoding.as_bytes())
            .ok_or_else(|| Error::InvalidConfig(format!("unknown source encoding '{}'", self.source_encoding)))
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub result_limit: usize,
    pub snippet_chars: usize,
    pub languages: Vec<Language>,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { result_limit: 10_000, snippet_chars: 150, languages: Language::ALL.to_vec() } }
}

/// `[data]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSettings {
    pub input_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { input_dir: "../dev_data/txt".to_string(), index_dir: "../dev_data/indexes/kwsearch".to_string() } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(toml: &str) -> anyhow::Result<Config> { Config::from_figment(Figment::new().merge(Toml::string(toml))) }

    #[test]
    fn empty_config_uses_defaults() {
        let config = config_from("").unwrap();
        assert_eq!(config.chunking().unwrap(), ChunkingSettings::default());
        assert_eq!(config.search().unwrap().snippet_chars, 150);
    }

    #[test]
    fn partial_section_overrides_only_given_keys() {
        let config = config_from("[chunking]\nmax_chunk_chars = 4096\ncharset = \"utf16-le\"\nlanguage = \"german\"\n").unwrap();
        let chunking = config.chunking().unwrap();
        assert_eq!(chunking.max_chunk_chars, 4096);
        assert_eq!(chunking.single_read_chars, ChunkLimits::default().single_read_chars);
        assert_eq!(chunking.charset, Charset::Utf16Le);
        assert_eq!(chunking.language, Some(Language::German));
    }

    #[test]
    fn inconsistent_limits_are_rejected() {
        assert!(config_from("[chunking]\nmax_chunk_chars = 100\nsingle_read_chars = 80\nextra_margin_chars = 30\n").is_err());
    }

    #[test]
    fn zero_search_limits_are_rejected() {
        assert!(config_from("[search]\nsnippet_chars = 0\n").is_err());
        assert!(config_from("[search]\nresult_limit = 0\n").is_err());
        assert!(config_from("[search]\nsnippet_chars = 1\n").is_ok());
    }

    #[test]
    fn source_encoding_label_is_resolved() {
        let settings = ChunkingSettings { source_encoding: "latin1".into(), ..ChunkingSettings::default() };
        assert_eq!(settings.source_encoding().unwrap(), encoding_rs::WINDOWS_1252);
        let bad = ChunkingSettings { source_encoding: "klingon".into(), ..ChunkingSettings::default() };
        assert!(bad.source_encoding().is_err());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/base");
        assert_eq!(resolve_with_base(base, "/abs/idx"), PathBuf::from("/abs/idx"));
        assert_eq!(resolve_with_base(base, "rel/idx"), PathBuf::from("/base/rel/idx"));
    }
}
