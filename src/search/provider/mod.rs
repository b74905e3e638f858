#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ingest::ingest_document;
use super::query::{SimilarityQuery, run_similarity_query};
use super::{SearchRequest, SearchResponse, SearchableDocument};
use crate::config::{Config, LayeredResolver, NameResolver};
use crate::database::{
    ClientFactory, ConnectionRegistry, RequestProperties, ShutdownSummary, StoreClientFactory,
};
use crate::{Result, SearchError};

/// Document ingestion and similarity search over named connections
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Store one row per chunk of `document`
    ///
    /// The token is checked once, before anything is sent to the store.
    async fn add_document(
        &self,
        document: SearchableDocument,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    /// Top matches for the request's embedding, most similar first
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;
}

/// [`SearchProvider`] backed by the connection registry
pub struct StoreSearchProvider {
    registry: ConnectionRegistry,
    server_timeout: Option<Duration>,
}

impl StoreSearchProvider {
    #[inline]
    pub fn new(resolver: Arc<dyn NameResolver>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            registry: ConnectionRegistry::new(resolver, factory),
            server_timeout: None,
        }
    }

    /// Resolve names through the config file then the environment
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.request_timeout();
        let resolver = Arc::new(LayeredResolver::from_config(config));
        let factory = Arc::new(StoreClientFactory::new(timeout));
        Self::new(resolver, factory).with_server_timeout(timeout)
    }

    /// Ask the store to stop a query after `timeout`
    #[inline]
    #[must_use]
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }

    #[inline]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Like [`SearchProvider::search`], but stops waiting once `cancellation` fires
    #[inline]
    pub async fn search_with_cancellation(
        &self,
        request: SearchRequest,
        cancellation: &CancellationToken,
    ) -> Result<SearchResponse> {
        if cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let connection_name = request.connection_info.connection_name.clone();
        tokio::select! {
            () = cancellation.cancelled() => {
                debug!("Search on '{}' was cancelled", connection_name);
                Err(SearchError::Cancelled)
            }
            response = self.search(request) => response,
        }
    }

    /// Close every cached client
    #[inline]
    pub async fn shutdown(&self) -> ShutdownSummary {
        let summary = self.registry.shutdown().await;
        info!(
            "Search provider shut down ({} clients closed, {} failed)",
            summary.closed, summary.failed
        );
        summary
    }

    fn request_properties(&self) -> RequestProperties {
        self.server_timeout
            .map_or_else(RequestProperties::new, |timeout| {
                RequestProperties::new().with_server_timeout(timeout)
            })
    }
}

#[async_trait]
impl SearchProvider for StoreSearchProvider {
    async fn add_document(
        &self,
        document: SearchableDocument,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let handle = self
            .registry
            .ingest_client(&document.connection_info.connection_name)
            .await?;

        if cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        ingest_document(
            handle.client.as_ref(),
            &handle.descriptor.initial_catalog,
            &document,
        )
        .await
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let query = SimilarityQuery::from_request(&request)?;
        let handle = self
            .registry
            .query_client(&request.connection_info.connection_name)
            .await?;

        run_similarity_query(
            handle.client.as_ref(),
            &handle.descriptor.initial_catalog,
            &query,
            &self.request_properties(),
        )
        .await
    }
}
