// Search module
// Document ingestion and cosine-similarity search over the store backends


pub mod encoding;
pub mod ingest;
pub mod provider;
pub mod query;

use serde::{Deserialize, Serialize};

pub use provider::{SearchProvider, StoreSearchProvider};

/// Logical destination of a request: a named connection and a table in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_name: String,
    pub collection_name: String,
}

impl ConnectionInfo {
    #[inline]
    pub fn new(connection_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            collection_name: collection_name.into(),
        }
    }
}

/// A slice of a document's text together with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A document ready for ingestion, one stored row per chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchableDocument {
    /// Usually the source file name; the extension is dropped on ingestion
    pub title: String,
    pub connection_info: ConnectionInfo,
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
}

impl SearchableDocument {
    #[inline]
    pub fn new(title: impl Into<String>, connection_info: ConnectionInfo) -> Self {
        Self {
            title: title.into(),
            connection_info,
            chunks: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_chunk(mut self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.chunks.push(DocumentChunk {
            text: text.into(),
            embedding,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub connection_info: ConnectionInfo,
    pub embedding: Vec<f32>,
    pub max_results: usize,
}

impl SearchRequest {
    #[inline]
    pub fn new(connection_info: ConnectionInfo, embedding: Vec<f32>, max_results: usize) -> Self {
        Self {
            connection_info,
            embedding,
            max_results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub text: String,
}

/// Matches ordered by descending similarity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    #[inline]
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }
}

impl IntoIterator for SearchResponse {
    type Item = SearchResult;
    type IntoIter = std::vec::IntoIter<SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
