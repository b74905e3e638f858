// Database module
// Store client traits, connection strings, the client registry and the
// concrete backends (Kusto over REST, LanceDB for local/object-store tables)


pub mod connection;
pub mod kusto;
pub mod lancedb;
pub mod registry;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::search::query::SimilarityQuery;
use crate::{Result, SearchError};
use connection::{ConnectionDescriptor, StoreKind};

pub use registry::{ClientHandle, ConnectionRegistry, ShutdownSummary};

/// Forward-only cursor over query result rows
pub type RowStream = BoxStream<'static, Result<QueryRow>>;

/// One result row with by-name column access
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl QueryRow {
    #[inline]
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    #[inline]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
    }

    #[inline]
    pub fn get_str(&self, column: &str) -> Result<&str> {
        match self.get(column) {
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(other) => Err(SearchError::BackendQuery(format!(
                "Column '{}' is not a string: {}",
                column, other
            ))),
            None => Err(SearchError::BackendQuery(format!(
                "Missing {} column",
                column
            ))),
        }
    }

    #[inline]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Destination of an ingestion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTarget {
    pub database: String,
    pub table: String,
}

/// Per-request options sent alongside a query
#[derive(Debug, Clone, PartialEq)]
pub struct RequestProperties {
    pub client_request_id: String,
    pub options: BTreeMap<String, Value>,
}

impl Default for RequestProperties {
    fn default() -> Self {
        Self {
            client_request_id: format!("search-provider;{}", Uuid::new_v4()),
            options: BTreeMap::new(),
        }
    }
}

impl RequestProperties {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to give up after `timeout`, formatted as `hh:mm:ss`
    #[inline]
    #[must_use]
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        let seconds = timeout.as_secs();
        self.options.insert(
            "servertimeout".to_string(),
            Value::String(format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                (seconds % 3600) / 60,
                seconds % 60
            )),
        );
        self
    }
}

/// Behaviour shared by every store client
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Release the client's resources; called once, at shutdown
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait QueryClient: StoreClient {
    async fn execute_query(
        &self,
        database: &str,
        query: &SimilarityQuery,
        properties: &RequestProperties,
    ) -> Result<RowStream>;
}

#[async_trait]
pub trait IngestClient: StoreClient {
    async fn ingest(&self, target: &IngestTarget, batch: RecordBatch) -> Result<()>;
}

/// Builds store clients for a parsed connection string
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create_query_client(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryClient>>;

    async fn create_ingest_client(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn IngestClient>>;
}

/// Picks the backend from the data source scheme
#[derive(Debug, Clone)]
pub struct StoreClientFactory {
    request_timeout: Duration,
}

impl Default for StoreClientFactory {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(
                crate::config::settings::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            ),
        }
    }
}

impl StoreClientFactory {
    #[inline]
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl ClientFactory for StoreClientFactory {
    async fn create_query_client(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryClient>> {
        let kind = descriptor.store_kind()?;
        debug!("Creating {} query client for {}", kind, descriptor.data_source);
        match kind {
            StoreKind::Kusto => Ok(Arc::new(kusto::KustoClient::new(
                descriptor,
                self.request_timeout,
            )?)),
            StoreKind::LanceDb => Ok(Arc::new(
                lancedb::LanceClient::connect(descriptor).await?,
            )),
        }
    }

    async fn create_ingest_client(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn IngestClient>> {
        let kind = descriptor.store_kind()?;
        debug!("Creating {} ingest client for {}", kind, descriptor.data_source);
        match kind {
            StoreKind::Kusto => Ok(Arc::new(kusto::KustoClient::new(
                descriptor,
                self.request_timeout,
            )?)),
            StoreKind::LanceDb => Ok(Arc::new(
                lancedb::LanceClient::connect(descriptor).await?,
            )),
        }
    }
}
