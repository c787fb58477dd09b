use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use encoding_rs::Encoding;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use walkdir::WalkDir;

use kwsearch_core::config::{expand_path, ChunkingSettings, Config};
use kwsearch_core::error::QueryError;
use kwsearch_core::traits::{NeverCancel, SearchService};
use kwsearch_core::types::{KeywordHit, TextField};
use kwsearch_core::{ChunkingPipeline, DecodingSource, ExtractionError, SourceDocument};
use kwsearch_hits::{find_hits, Highlighter, Keyword};
use kwsearch_text::{TantivyIndexer, TantivySearchEngine};

const USAGE: &str = "Usage: kwsearch <command> [args...]

Commands:
  ingest [input_dir] [--fresh]          chunk and index every .txt file
  query <term> [--query] [--json]       find keyword hits, one per chunk
  stats                                 document counts by kind
  show <object_id> <chunk> <term>       print one chunk with the term marked";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kwsearch=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let (cmd, args) = parse_args();
    let flags: Vec<&str> = args.iter().map(String::as_str).filter(|a| a.starts_with("--")).collect();
    let positional: Vec<&str> = args.iter().map(String::as_str).filter(|a| !a.starts_with("--")).collect();
    let index_dir = expand_path(config.data()?.index_dir);

    match cmd.as_str() {
        "ingest" => {
            let input_dir = match positional.first() {
                Some(dir) => PathBuf::from(dir),
                None => expand_path(config.data()?.input_dir),
            };
            ingest(&config.chunking()?, &input_dir, &index_dir, flags.contains(&"--fresh"))?;
        }
        "query" => {
            let Some(term) = positional.first() else {
                eprintln!("Usage: kwsearch query \"<term>\" [--query] [--json]");
                std::process::exit(1);
            };
            let keyword = if flags.contains(&"--query") { Keyword::query(*term) } else { Keyword::literal(*term) };
            let settings = config.search()?;
            let engine = open_engine(&index_dir)?.with_languages(settings.languages.clone());
            match find_hits(&engine, &keyword, &settings) {
                Ok(hits) if flags.contains(&"--json") => println!("{}", serde_json::to_string_pretty(&hits)?),
                Ok(hits) => print_hits(&keyword, &hits),
                Err(e) => exit_with(&e),
            }
        }
        "stats" => {
            let stats = open_engine(&index_dir)?.stats()?;
            println!("📊 Index at {}", index_dir.display());
            println!("   files:       {}", stats.files);
            println!("   chunks:      {}", stats.chunks);
            println!("   mini-chunks: {}", stats.mini_chunks);
        }
        "show" => {
            let (Some(object_id), Some(chunk), Some(term)) = (positional.first(), positional.get(1), positional.get(2)) else {
                eprintln!("Usage: kwsearch show <object_id> <chunk> <term>");
                std::process::exit(1);
            };
            let object_id: i64 = object_id.parse().with_context(|| format!("invalid object id '{object_id}'"))?;
            let chunk: u32 = chunk.parse().with_context(|| format!("invalid chunk number '{chunk}'"))?;
            show(&open_engine(&index_dir)?, object_id, chunk, term)?;
        }
        _ => {
            eprintln!("Unknown command: {cmd}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn open_engine(index_dir: &Path) -> anyhow::Result<TantivySearchEngine> {
    TantivySearchEngine::new(index_dir.to_path_buf()).with_context(|| format!("no index at {}; run `kwsearch ingest` first", index_dir.display()))
}

fn exit_with(err: &QueryError) -> ! {
    tracing::debug!(error = ?err, "query failed");
    eprintln!("❌ {}", err.user_message());
    std::process::exit(1);
}

/// Text files under `dir` in path order; object ids follow that order.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

fn ingest(settings: &ChunkingSettings, input_dir: &Path, index_dir: &Path, fresh: bool) -> anyhow::Result<()> {
    let fallback = settings.source_encoding()?;
    settings.limits().validate()?;
    let files = collect_files(input_dir);
    println!("📂 Ingesting {} files from {}", files.len(), input_dir.display());

    let indexer = if fresh { TantivyIndexer::new(index_dir.to_path_buf())? } else { TantivyIndexer::open_or_create(index_dir)? };
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );

    let results: Vec<(PathBuf, anyhow::Result<u32>)> = files
        .par_iter()
        .enumerate()
        .map_init(
            || ChunkingPipeline::from_settings(&indexer, settings),
            |pipeline, (i, path)| {
                let outcome = match pipeline.as_mut() {
                    Ok(pipeline) => index_file(pipeline, i as i64 + 1, path, fallback).map_err(anyhow::Error::from),
                    Err(e) => Err(anyhow::anyhow!("chunking pipeline unavailable: {e}")),
                };
                pb.inc(1);
                (path.clone(), outcome)
            },
        )
        .collect();
    pb.finish_with_message("chunked");

    let mut chunks = 0u64;
    let mut failed = 0usize;
    for (path, outcome) in results {
        match outcome {
            Ok(n) => chunks += u64::from(n),
            Err(e) => {
                failed += 1;
                tracing::error!(file = %path.display(), error = %format!("{e:#}"), "failed to index file");
            }
        }
    }
    if !fresh {
        indexer.prune_objects_above(files.len() as i64)?;
    }
    indexer.commit()?;

    let stats = TantivySearchEngine::from_index(indexer.index().clone())?.stats()?;
    println!("✅ Ingest complete: {chunks} chunks from {} files ({failed} failed)", stats.files);
    println!("   index now holds {} chunks and {} mini-chunks", stats.chunks, stats.mini_chunks);
    Ok(())
}

fn index_file(pipeline: &mut ChunkingPipeline<'_>, object_id: i64, path: &Path, fallback: &'static Encoding) -> Result<u32, ExtractionError> {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let doc = SourceDocument::new(object_id, name).with_field("path", path.display().to_string());
    let file = File::open(path).map_err(|source| ExtractionError::StreamRead { object_id, chunks_indexed: 0, source })?;
    let mut source = DecodingSource::new(BufReader::new(file), fallback);
    pipeline.process(&doc, &mut source, &NeverCancel).map(|o| o.chunks())
}

fn print_hits(keyword: &Keyword, hits: &[KeywordHit]) {
    if hits.is_empty() {
        println!("No hits for '{}'.", keyword.term);
        return;
    }
    println!("🔎 {} hits for '{}'", hits.len(), keyword.term);
    for hit in hits {
        let origin = if hit.is_artifact_hit() { " artifact" } else { "" };
        println!("[{}:{}] ({}{origin})", hit.object_id, hit.chunk, hit.field.name());
        if !hit.snippet.is_empty() {
            println!("    {}", hit.snippet.replace('\n', " "));
        }
    }
}

fn show(engine: &TantivySearchEngine, object_id: i64, chunk: u32, term: &str) -> anyhow::Result<()> {
    let doc_id = format!("{object_id}_{chunk}");
    let Some(text) = engine.stored_text(&doc_id, TextField::Default)? else {
        anyhow::bail!("chunk {doc_id} is not in the index");
    };
    if let Some(parent) = engine.parent_info(object_id)? {
        println!("📄 {} (chunk {chunk} of {})", parent.file_name, parent.num_chunks);
    }
    let words = Keyword::query(term).words();
    match Highlighter::new(&words) {
        Some(highlighter) => {
            let (marked, count) = highlighter.highlight_all(&text);
            println!("{count} occurrences of '{term}'\n");
            println!("{marked}");
        }
        None => println!("{text}"),
    }
    Ok(())
}
