// LanceDB store backend
// Each catalog is a LanceDB dataset directory under the data source, and each
// collection is a table inside it


use arrow::array::RecordBatchIterator;
use arrow::json::ArrayWriter;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use ::lancedb::Connection;
use ::lancedb::query::{ExecutableQuery, QueryBase, Select};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::connection::ConnectionDescriptor;
use super::{
    IngestClient, IngestTarget, QueryClient, QueryRow, RequestProperties, RowStream, StoreClient,
};
use crate::search::query::{
    EMBEDDINGS_COLUMN, PROJECTED_COLUMNS, SIMILARITY_COLUMN, SimilarityQuery,
};
use crate::{Result, SearchError};

const DISTANCE_COLUMN: &str = "_distance";

/// Query and ingest client for one LanceDB data source
pub struct LanceClient {
    data_source: String,
    catalog: String,
    connection: Connection,
}

impl LanceClient {
    /// Open the dataset for the descriptor's catalog, creating local directories
    #[inline]
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let data_source = descriptor.data_source.trim_end_matches('/').to_string();
        let connection = open_dataset(&data_source, &descriptor.initial_catalog).await?;
        info!(
            "Connected to LanceDB dataset {}",
            dataset_uri(&data_source, &descriptor.initial_catalog)
        );

        Ok(Self {
            data_source,
            catalog: descriptor.initial_catalog.clone(),
            connection,
        })
    }

    async fn connection_for(&self, database: &str) -> Result<Connection> {
        if database == self.catalog {
            return Ok(self.connection.clone());
        }
        open_dataset(&self.data_source, database).await
    }

    async fn append(connection: &Connection, table: &str, batch: RecordBatch) -> Result<()> {
        let table = connection
            .open_table(table)
            .execute()
            .await
            .map_err(|e| SearchError::BackendIngest(format!("Failed to open table: {}", e)))?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| SearchError::BackendIngest(format!("Failed to insert rows: {}", e)))?;
        Ok(())
    }
}

/// `{data_source}/{catalog}`
#[inline]
pub fn dataset_uri(data_source: &str, catalog: &str) -> String {
    format!("{}/{}", data_source.trim_end_matches('/'), catalog)
}

/// Filesystem path for `file://` and scheme-less locations
fn local_path(uri: &str) -> Option<PathBuf> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    (!uri.contains("://")).then(|| PathBuf::from(uri))
}

async fn open_dataset(data_source: &str, catalog: &str) -> Result<Connection> {
    let uri = dataset_uri(data_source, catalog);
    if let Some(path) = local_path(&uri) {
        std::fs::create_dir_all(&path).map_err(|e| {
            SearchError::Configuration(format!(
                "Failed to create dataset directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }

    ::lancedb::connect(&uri).execute().await.map_err(|e| {
        SearchError::Configuration(format!("Failed to connect to LanceDB at {}: {}", uri, e))
    })
}

/// Convert a result batch into rows in projection order, deriving similarity from cosine distance
fn batch_to_rows(batch: &RecordBatch, columns: &Arc<[String]>) -> Result<Vec<QueryRow>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }

    let mut writer = ArrayWriter::new(Vec::new());
    writer
        .write(batch)
        .and_then(|()| writer.finish())
        .map_err(|e| SearchError::BackendQuery(format!("Failed to read result batch: {}", e)))?;
    let objects: Vec<Map<String, Value>> = serde_json::from_slice(&writer.into_inner())
        .map_err(|e| SearchError::BackendQuery(format!("Failed to decode result batch: {}", e)))?;

    objects
        .into_iter()
        .map(|mut object| {
            let distance = object
                .get(DISTANCE_COLUMN)
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    SearchError::BackendQuery(format!("Missing {} column", DISTANCE_COLUMN))
                })?;
            let values = columns
                .iter()
                .map(|column| {
                    if column == SIMILARITY_COLUMN {
                        Value::from(1.0 - distance)
                    } else {
                        object.remove(column).unwrap_or(Value::Null)
                    }
                })
                .collect();
            Ok(QueryRow::new(Arc::clone(columns), values))
        })
        .collect()
}

#[async_trait]
impl StoreClient for LanceClient {
    async fn close(&self) -> Result<()> {
        debug!("Closing LanceDB client for {}", self.data_source);
        Ok(())
    }
}

#[async_trait]
impl QueryClient for LanceClient {
    async fn execute_query(
        &self,
        database: &str,
        query: &SimilarityQuery,
        properties: &RequestProperties,
    ) -> Result<RowStream> {
        debug!(
            "Running LanceDB vector search {} on {}.{}",
            properties.client_request_id,
            database,
            query.table()
        );
        let connection = self.connection_for(database).await?;
        let table = connection
            .open_table(query.table().as_str())
            .execute()
            .await
            .map_err(|e| SearchError::BackendQuery(format!("Failed to open table: {}", e)))?;

        let selected = PROJECTED_COLUMNS
            .iter()
            .filter(|column| **column != SIMILARITY_COLUMN)
            .map(|column| column.to_string())
            .collect();
        let batches = table
            .vector_search(query.vector())
            .map_err(|e| SearchError::BackendQuery(format!("Failed to create vector search: {}", e)))?
            .column(EMBEDDINGS_COLUMN)
            .distance_type(::lancedb::DistanceType::Cosine)
            .limit(query.max_results())
            .select(Select::Columns(selected))
            .execute()
            .await
            .map_err(|e| SearchError::BackendQuery(format!("Failed to execute search: {}", e)))?;

        let columns: Arc<[String]> = PROJECTED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = batches
            .map(move |batch| {
                batch
                    .map_err(|e| {
                        SearchError::BackendQuery(format!("Failed to read result stream: {}", e))
                    })
                    .and_then(|batch| batch_to_rows(&batch, &columns))
            })
            .map_ok(|rows| futures::stream::iter(rows.into_iter().map(Ok::<_, SearchError>)))
            .try_flatten()
            .boxed();
        Ok(rows)
    }
}

#[async_trait]
impl IngestClient for LanceClient {
    async fn ingest(&self, target: &IngestTarget, batch: RecordBatch) -> Result<()> {
        let connection = self.connection_for(&target.database).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::BackendIngest(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&target.table) {
            return Self::append(&connection, &target.table, batch).await;
        }

        info!("Creating table {} in {}", target.table, target.database);
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch.clone())), schema);
        match connection.create_table(&target.table, reader).execute().await {
            Ok(_) => Ok(()),
            // Another writer created it between the listing and the create
            Err(::lancedb::Error::TableAlreadyExists { .. }) => {
                Self::append(&connection, &target.table, batch).await
            }
            Err(e) => Err(SearchError::BackendIngest(format!(
                "Failed to create table: {}",
                e
            ))),
        }
    }
}
