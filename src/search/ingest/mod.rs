// Ingestion batch building
// Turns a SearchableDocument into one Arrow row per chunk


use arrow::array::{ArrayRef, FixedSizeListArray, Float32Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::SearchableDocument;
use super::encoding::validate_vector;
use super::query::{
    EMBEDDINGS_COLUMN, ID_COLUMN, TEXT_COLUMN, TIMESTAMP_COLUMN, TITLE_COLUMN, TableName,
};
use crate::database::{IngestClient, IngestTarget};
use crate::{Result, SearchError};

pub const TIMESTAMP_TIMEZONE: &str = "UTC";

/// Stored row layout for embeddings of `dimension` components
#[inline]
pub fn document_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(TITLE_COLUMN, DataType::Utf8, false),
        Field::new(TEXT_COLUMN, DataType::Utf8, false),
        Field::new(
            EMBEDDINGS_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension,
            ),
            false,
        ),
        Field::new(
            TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, Some(TIMESTAMP_TIMEZONE.into())),
            false,
        ),
    ]))
}

/// Drop the directory and the last extension: `docs/guide.md` becomes `guide`
#[inline]
pub fn strip_title(title: &str) -> &str {
    Path::new(title)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(title)
}

/// Build the rows for a document, or `None` when it has no chunks
///
/// Every chunk must carry a valid embedding and all embeddings must share
/// one dimension.
#[inline]
pub fn build_ingest_batch(document: &SearchableDocument) -> Result<Option<RecordBatch>> {
    let Some(first) = document.chunks.first() else {
        return Ok(None);
    };

    let dimension = first.embedding.len();
    let list_size = i32::try_from(dimension).map_err(|_| {
        SearchError::InvalidEmbedding(format!("dimension {} is too large", dimension))
    })?;

    let len = document.chunks.len();
    let title = strip_title(&document.title);

    let mut ids = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut timestamps = Vec::with_capacity(len);

    for (index, chunk) in document.chunks.iter().enumerate() {
        validate_vector(&chunk.embedding).map_err(|e| match e {
            SearchError::InvalidEmbedding(message) => {
                SearchError::InvalidEmbedding(format!("chunk {}: {}", index, message))
            }
            other => other,
        })?;
        if chunk.embedding.len() != dimension {
            return Err(SearchError::InvalidEmbedding(format!(
                "chunk {} has {} components, expected {}",
                index,
                chunk.embedding.len(),
                dimension
            )));
        }

        ids.push(Uuid::new_v4().simple().to_string());
        texts.push(chunk.text.as_str());
        flat_values.extend_from_slice(&chunk.embedding);
        timestamps.push(Utc::now().timestamp_micros());
    }

    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let embeddings = FixedSizeListArray::try_new(
        item,
        list_size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| SearchError::InvalidEmbedding(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(vec![title; len])),
        Arc::new(StringArray::from(texts)),
        Arc::new(embeddings),
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone(TIMESTAMP_TIMEZONE)),
    ];

    let batch = RecordBatch::try_new(document_schema(list_size), arrays).map_err(|e| {
        SearchError::BackendIngest(format!("Failed to create record batch: {}", e))
    })?;
    Ok(Some(batch))
}

/// Send a document's rows to `database` using the table named in its connection info
#[inline]
pub async fn ingest_document(
    client: &dyn IngestClient,
    database: &str,
    document: &SearchableDocument,
) -> Result<()> {
    let table = TableName::parse(&document.connection_info.collection_name)?;
    let Some(batch) = build_ingest_batch(document)? else {
        debug!("Document '{}' has no chunks, nothing to ingest", document.title);
        return Ok(());
    };

    let target = IngestTarget {
        database: database.to_string(),
        table: table.as_str().to_string(),
    };
    let rows = batch.num_rows();
    client.ingest(&target, batch).await?;

    info!(
        "Ingested {} rows for '{}' into {}.{}",
        rows, document.title, target.database, target.table
    );
    Ok(())
}
