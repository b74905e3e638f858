// Kusto store backend
// Queries and streaming ingestion over the cluster's v1 REST endpoints


use arrow::json::LineDelimitedWriter;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::connection::ConnectionDescriptor;
use super::{
    IngestClient, IngestTarget, QueryClient, QueryRow, RequestProperties, RowStream, StoreClient,
};
use crate::search::query::SimilarityQuery;
use crate::{Result, SearchError};

const TOKEN_KEYS: &[&str] = &["application token", "user token", "token"];
const MAPPING_KEY: &str = "ingestion mapping";
const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryResponse {
    tables: Vec<ResponseTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseTable {
    columns: Vec<ResponseColumn>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseColumn {
    column_name: String,
}

struct HttpReply {
    status: u16,
    body: String,
}

/// REST client for one Kusto cluster, used for both queries and ingestion
pub struct KustoClient {
    base_url: Url,
    agent: ureq::Agent,
    token: Option<String>,
    mapping_name: Option<String>,
}

impl KustoClient {
    #[inline]
    pub fn new(descriptor: &ConnectionDescriptor, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&descriptor.data_source).map_err(|e| {
            SearchError::Configuration(format!(
                "Invalid cluster URL '{}': {}",
                descriptor.data_source, e
            ))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let token = TOKEN_KEYS
            .iter()
            .find_map(|key| descriptor.property(key))
            .map(str::to_string);
        if token.is_none() {
            debug!(
                "No token in connection string for {}, requests are unauthenticated",
                descriptor.data_source
            );
        }

        Ok(Self {
            base_url,
            agent,
            token,
            mapping_name: descriptor.property(MAPPING_KEY).map(str::to_string),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                SearchError::Configuration(format!("Cluster URL '{}' has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Run a blocking POST on the blocking pool
    async fn post(
        &self,
        url: Url,
        content_type: &'static str,
        body: String,
        request_id: String,
    ) -> std::result::Result<HttpReply, String> {
        let agent = self.agent.clone();
        let authorization = self.token.as_ref().map(|token| format!("Bearer {}", token));

        tokio::task::spawn_blocking(move || {
            let mut request = agent
                .post(url.as_str())
                .header("Content-Type", content_type)
                .header("Accept", "application/json")
                .header(REQUEST_ID_HEADER, &request_id);
            if let Some(authorization) = &authorization {
                request = request.header("Authorization", authorization);
            }

            let mut response = request.send(&body)?;
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string()?;
            Ok::<_, ureq::Error>(HttpReply { status, body })
        })
        .await
        .map_err(|e| format!("HTTP task failed: {}", e))?
        .map_err(|e| e.to_string())
    }
}

/// Best-effort extraction of the service's error message
fn error_message(reply: &HttpReply) -> String {
    let message = serde_json::from_str::<Value>(&reply.body)
        .ok()
        .and_then(|body| {
            let error = body.get("error")?;
            error
                .get("@message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| reply.body.trim().to_string());
    format!("HTTP {}: {}", reply.status, message)
}

/// Request body for `/v1/rest/query`
fn query_body(database: &str, query: &SimilarityQuery, properties: &RequestProperties) -> Value {
    let options: Map<String, Value> = properties
        .options
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let parameters: Map<String, Value> = query
        .parameters()
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();

    json!({
        "db": database,
        "csl": query.text(),
        "properties": json!({
            "Options": options,
            "Parameters": parameters,
        })
        .to_string(),
    })
}

/// Rows of the first table in a v1 response
fn parse_query_response(body: &str) -> Result<Vec<QueryRow>> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::BackendQuery(format!("Failed to parse query response: {}", e)))?;
    let Some(table) = response.tables.into_iter().next() else {
        return Err(SearchError::BackendQuery(
            "Query response contained no tables".to_string(),
        ));
    };

    let columns: Arc<[String]> = table
        .columns
        .into_iter()
        .map(|column| column.column_name)
        .collect();
    Ok(table
        .rows
        .into_iter()
        .map(|values| QueryRow::new(Arc::clone(&columns), values))
        .collect())
}

/// Newline-delimited JSON, one object per row
fn multijson_body(batch: &RecordBatch) -> Result<String> {
    let mut writer = LineDelimitedWriter::new(Vec::new());
    writer
        .write(batch)
        .and_then(|()| writer.finish())
        .map_err(|e| SearchError::BackendIngest(format!("Failed to encode rows: {}", e)))?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| SearchError::BackendIngest(format!("Encoded rows are not UTF-8: {}", e)))
}

#[async_trait]
impl StoreClient for KustoClient {
    async fn close(&self) -> Result<()> {
        debug!("Closing Kusto client for {}", self.base_url);
        Ok(())
    }
}

#[async_trait]
impl QueryClient for KustoClient {
    async fn execute_query(
        &self,
        database: &str,
        query: &SimilarityQuery,
        properties: &RequestProperties,
    ) -> Result<RowStream> {
        let url = self.endpoint(&["v1", "rest", "query"])?;
        let body = query_body(database, query, properties).to_string();

        let reply = self
            .post(
                url,
                "application/json; charset=utf-8",
                body,
                properties.client_request_id.clone(),
            )
            .await
            .map_err(SearchError::BackendQuery)?;
        if !(200..300).contains(&reply.status) {
            warn!("Kusto query on {} failed with HTTP {}", database, reply.status);
            return Err(SearchError::BackendQuery(error_message(&reply)));
        }

        let rows = parse_query_response(&reply.body)?;
        debug!("Kusto query returned {} rows", rows.len());
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl IngestClient for KustoClient {
    async fn ingest(&self, target: &IngestTarget, batch: RecordBatch) -> Result<()> {
        let mut url = self.endpoint(&[
            "v1",
            "rest",
            "ingest",
            target.database.as_str(),
            target.table.as_str(),
        ])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("streamFormat", "multijson");
            if let Some(mapping) = &self.mapping_name {
                pairs.append_pair("mappingName", mapping);
            }
        }

        let body = multijson_body(&batch)?;
        let request_id = RequestProperties::new().client_request_id;
        let reply = self
            .post(url, "application/json; charset=utf-8", body, request_id)
            .await
            .map_err(SearchError::BackendIngest)?;
        if !(200..300).contains(&reply.status) {
            warn!(
                "Kusto ingestion into {}.{} failed with HTTP {}",
                target.database, target.table, reply.status
            );
            return Err(SearchError::BackendIngest(error_message(&reply)));
        }

        debug!(
            "Streamed {} rows into {}.{}",
            batch.num_rows(),
            target.database,
            target.table
        );
        Ok(())
    }
}
