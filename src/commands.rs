use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::search::encoding::parse_vector_literal;
use crate::search::{
    ConnectionInfo, SearchProvider, SearchRequest, SearchableDocument, StoreSearchProvider,
};

/// Where the query embedding for `search` comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingSource {
    /// Comma-separated floats given on the command line
    Inline(String),
    /// File holding a JSON array or a comma-separated list
    File(PathBuf),
}

impl EmbeddingSource {
    #[inline]
    pub fn load(&self) -> Result<Vec<f32>> {
        match self {
            Self::Inline(literal) => {
                parse_vector_literal(literal).context("Failed to parse --embedding")
            }
            Self::File(path) => read_embedding_file(path),
        }
    }
}

/// Read an embedding from a JSON array file, falling back to the text forms
#[inline]
pub fn read_embedding_file(path: &Path) -> Result<Vec<f32>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read embedding file {}", path.display()))?;

    if let Ok(vector) = serde_json::from_str::<Vec<f32>>(&contents) {
        return Ok(vector);
    }
    parse_vector_literal(&contents)
        .with_context(|| format!("Failed to parse embedding file {}", path.display()))
}

/// Load a document JSON file, optionally redirecting it to another connection or collection
#[inline]
pub fn read_document(
    path: &Path,
    connection: Option<String>,
    collection: Option<String>,
) -> Result<SearchableDocument> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document file {}", path.display()))?;
    let mut document: SearchableDocument = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse document file {}", path.display()))?;

    if let Some(connection) = connection {
        document.connection_info.connection_name = connection;
    }
    if let Some(collection) = collection {
        document.connection_info.collection_name = collection;
    }
    Ok(document)
}

/// Ingest one document file
#[inline]
pub async fn add_document(
    config: &Config,
    path: &Path,
    connection: Option<String>,
    collection: Option<String>,
) -> Result<()> {
    let document = read_document(path, connection, collection)?;
    let chunks = document.chunks.len();
    let target = document.connection_info.clone();
    info!(
        "Adding '{}' ({} chunks) to {}/{}",
        document.title, chunks, target.connection_name, target.collection_name
    );

    let provider = StoreSearchProvider::from_config(config);
    let result = provider
        .add_document(document, &CancellationToken::new())
        .await;
    provider.shutdown().await;
    result.context("Failed to add document")?;

    if chunks == 0 {
        warn!("Document has no chunks, nothing was stored");
        println!("Nothing to add: the document has no chunks");
    } else {
        println!(
            "Added {} rows to {}/{}",
            chunks, target.connection_name, target.collection_name
        );
    }
    Ok(())
}

/// Run a similarity search and print the matches
#[inline]
pub async fn search(
    config: &Config,
    connection: String,
    collection: String,
    embedding: &EmbeddingSource,
    max_results: Option<usize>,
) -> Result<()> {
    let embedding = embedding.load()?;
    let max_results = max_results.unwrap_or(config.search.max_results as usize);
    if max_results == 0 {
        bail!("--max-results must be at least 1");
    }

    let request = SearchRequest::new(
        ConnectionInfo::new(connection, collection),
        embedding,
        max_results,
    );

    let provider = StoreSearchProvider::from_config(config);
    let cancellation = CancellationToken::new();
    let cancel_on_interrupt = cancellation.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_interrupt.cancel();
        }
    });

    let result = provider
        .search_with_cancellation(request, &cancellation)
        .await;
    interrupt.abort();
    provider.shutdown().await;
    let response = result.context("Search failed")?;

    if response.is_empty() {
        println!("No results found");
        return Ok(());
    }

    println!("Found {} results:", response.len());
    for (rank, result) in response.iter().enumerate() {
        println!();
        println!("{}. {}", rank + 1, result.title);
        println!("   {}", result.text.replace('\n', "\n   "));
    }
    Ok(())
}
