#[cfg(test)]
mod tests;

use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::encoding::{dynamic_literal, validate_vector};
use super::{SearchRequest, SearchResponse, SearchResult};
use crate::database::{QueryClient, RequestProperties, RowStream};
use crate::{Result, SearchError};

pub const SIMILARITY_COLUMN: &str = "similarity";
pub const ID_COLUMN: &str = "Id";
pub const TITLE_COLUMN: &str = "Title";
pub const TEXT_COLUMN: &str = "Text";
pub const EMBEDDINGS_COLUMN: &str = "Embeddings";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Upper bound on the row buffer preallocated from a requested result count
pub const MAX_CAPACITY_HINT: usize = 1024;

/// Columns returned by a similarity query, in order
pub const PROJECTED_COLUMNS: [&str; 6] = [
    SIMILARITY_COLUMN,
    ID_COLUMN,
    TITLE_COLUMN,
    TEXT_COLUMN,
    EMBEDDINGS_COLUMN,
    TIMESTAMP_COLUMN,
];

pub const VECTOR_PARAMETER: &str = "search_vector";
pub const LIMIT_PARAMETER: &str = "max_results";

/// A table identifier that is safe to place in query text
///
/// The name is trimmed and must be non-empty with no `/`, `;` or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    #[inline]
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim();
        if name.is_empty()
            || name.contains('/')
            || name.contains(';')
            || name.chars().any(char::is_whitespace)
        {
            return Err(SearchError::InvalidTableName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bracket-quoted identifier, e.g. `['Documents']`
    #[inline]
    pub fn quoted(&self) -> String {
        format!("['{}']", self.0.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-K cosine similarity query against one table
///
/// The query vector and result limit travel as bound parameters; only the
/// validated table name is part of the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    table: TableName,
    vector: Vec<f32>,
    vector_literal: String,
    max_results: usize,
}

impl SimilarityQuery {
    #[inline]
    pub fn new(table: TableName, vector: Vec<f32>, max_results: usize) -> Result<Self> {
        if max_results == 0 {
            return Err(SearchError::InvalidRequest(
                "max_results must be at least 1".to_string(),
            ));
        }
        if i64::try_from(max_results).is_err() {
            return Err(SearchError::InvalidRequest(format!(
                "max_results must be at most {}",
                i64::MAX
            )));
        }
        validate_vector(&vector)?;
        let vector_literal = dynamic_literal(&vector)?;

        Ok(Self {
            table,
            vector,
            vector_literal,
            max_results,
        })
    }

    /// Validate a request and turn it into a query; the table name is checked first
    #[inline]
    pub fn from_request(request: &SearchRequest) -> Result<Self> {
        let table = TableName::parse(&request.connection_info.collection_name)?;
        Self::new(table, request.embedding.clone(), request.max_results)
    }

    #[inline]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    #[inline]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    #[inline]
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Kusto query text; pair with [`Self::parameters`]
    #[inline]
    pub fn text(&self) -> String {
        format!(
            "declare query_parameters({vector}:dynamic, {limit}:long);\n\
             let series_cosine_similarity_fl=(vec1:dynamic, vec2:dynamic)\n\
             {{\n\
             \x20   let dp = series_dot_product(vec1, vec2);\n\
             \x20   let v1l = sqrt(series_dot_product(vec1, vec1));\n\
             \x20   let v2l = sqrt(series_dot_product(vec2, vec2));\n\
             \x20   dp/(v1l*v2l)\n\
             }};\n\
             {table}\n\
             | extend {similarity} = series_cosine_similarity_fl({vector}, {embeddings})\n\
             | top {limit} by {similarity} desc\n\
             | project {projection}",
            vector = VECTOR_PARAMETER,
            limit = LIMIT_PARAMETER,
            table = self.table.quoted(),
            similarity = SIMILARITY_COLUMN,
            embeddings = EMBEDDINGS_COLUMN,
            projection = PROJECTED_COLUMNS.join(", "),
        )
    }

    /// Values for the parameters declared by [`Self::text`]
    #[inline]
    pub fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (VECTOR_PARAMETER.to_string(), self.vector_literal.clone()),
            (LIMIT_PARAMETER.to_string(), self.max_results.to_string()),
        ])
    }
}

/// Run a query and collect its rows, keeping the order the store returned
#[inline]
pub async fn run_similarity_query(
    client: &dyn QueryClient,
    database: &str,
    query: &SimilarityQuery,
    properties: &RequestProperties,
) -> Result<SearchResponse> {
    debug!("Executing similarity query: {}", query.text());
    let rows = client.execute_query(database, query, properties).await?;
    let results = collect_results(rows, query.max_results()).await?;
    debug!("Similarity query returned {} results", results.len());
    Ok(SearchResponse::new(results))
}

/// Map each row to a [`SearchResult`] in cursor order
///
/// `capacity` is only a hint and is capped at [`MAX_CAPACITY_HINT`].
#[inline]
pub async fn collect_results(mut rows: RowStream, capacity: usize) -> Result<Vec<SearchResult>> {
    let mut results = Vec::with_capacity(capacity.min(MAX_CAPACITY_HINT));
    while let Some(row) = rows.try_next().await? {
        results.push(SearchResult {
            title: row.get_str(TITLE_COLUMN)?.to_string(),
            text: row.get_str(TEXT_COLUMN)?.to_string(),
        });
    }
    Ok(results)
}
