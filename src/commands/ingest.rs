use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ask, embedder, openai_api_key, LineSource};
use crate::config::{DeviceType, Settings};
use crate::database::{open_store, Database, VectorStore};
use crate::document::loader::chunk_documents;
use crate::document::{load_documents, Document};
use crate::providers::traits::EmbeddingProvider;

const EMBED_BATCH: usize = 32;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub device_type: DeviceType,
    pub openai: bool,
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
}

/// `"default"` selects the configured source directory.
pub fn resolve_source_dir(answer: &str, default: &Path) -> PathBuf {
    let answer = answer.trim();
    if answer == "default" || answer.is_empty() {
        default.to_path_buf()
    } else {
        PathBuf::from(answer)
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// Loads, splits, embeds and stores everything in `source_dir`.
pub async fn ingest_directory(
    settings: &Settings,
    source_dir: &Path,
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    ledger: Option<&Database>,
    show_progress: bool,
) -> Result<IngestSummary> {
    log::info!("Loading documents from {}", source_dir.display());
    let documents = load_documents(source_dir, settings.ingest_threads).await?;
    let document_count = documents.len();

    let texts = chunk_documents(documents, settings.chunk_size, settings.chunk_overlap);
    log::info!("Loaded {} documents from {}", document_count, source_dir.display());
    log::info!("Split into {} chunks of text", texts.len());

    if texts.is_empty() {
        return Ok(IngestSummary {
            documents: document_count,
            chunks: 0,
        });
    }

    let bar = if show_progress {
        progress_bar(texts.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH) {
        let contents: Vec<String> = batch.iter().map(|doc| doc.page_content.clone()).collect();
        let batch_embeddings = embedder
            .embed_documents(&contents)
            .await
            .with_context(|| format!("Embedding with {} failed", embedder.model_name()))?;
        embeddings.extend(batch_embeddings);
        bar.inc(batch.len() as u64);
    }
    bar.finish_and_clear();

    // One write for the whole folder.
    if let Some(first) = embeddings.first() {
        store.ensure_collection(first.len()).await?;
    }
    store.add_documents(&texts, embeddings).await?;

    if let Some(ledger) = ledger {
        for (source, chunks) in chunks_per_source(&texts) {
            ledger.record_ingest(source, chunks).await?;
        }
    }

    Ok(IngestSummary {
        documents: document_count,
        chunks: texts.len(),
    })
}

fn chunks_per_source(texts: &[Document]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for text in texts {
        *counts.entry(text.source().to_string()).or_insert(0) += 1;
    }
    counts
}

pub async fn run(settings: &Settings, options: IngestOptions, input: &mut dyn LineSource) -> Result<()> {
    super::system::print_banner("ingest", settings);
    let source_dir = match &options.source_dir {
        Some(dir) => dir.clone(),
        None => {
            let answer = ask(input, "Source directory (type \"default\" for default): ")?;
            resolve_source_dir(&answer, &settings.source_directory)
        }
    };

    let openai_key = if options.openai {
        Some(openai_api_key(input)?)
    } else {
        None
    };
    let embedder: Arc<dyn EmbeddingProvider> = embedder(settings, options.device_type, openai_key.as_deref())?;
    let store = open_store(settings).await?;
    let ledger = Database::new(settings.ledger_path()).await?;

    let summary = ingest_directory(
        settings,
        &source_dir,
        embedder.as_ref(),
        store.as_ref(),
        Some(&ledger),
        true,
    )
    .await?;

    println!(
        "✅ Ingested {} documents as {} chunks ({} stored)",
        summary.documents.to_string().cyan(),
        summary.chunks.to_string().cyan(),
        store.count().await?.to_string().cyan()
    );
    Ok(())
}
