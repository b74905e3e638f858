use super::*;
use crate::database::{QueryRow, StoreClient};
use crate::search::ConnectionInfo;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn table(name: &str) -> TableName {
    TableName::parse(name).expect("table name is valid")
}

#[test]
fn table_names_are_trimmed() {
    assert_eq!(table("  Documents ").as_str(), "Documents");
}

#[test]
fn invalid_table_names_are_rejected() {
    for raw in ["", "   ", "a/b", "Docs;drop", "two words", "tab\tname", "line\nbreak"] {
        assert!(
            matches!(TableName::parse(raw), Err(SearchError::InvalidTableName(_))),
            "'{}' should be rejected",
            raw
        );
    }
}

#[test]
fn invalid_table_name_message_names_the_table() {
    let err = TableName::parse("bad;name").expect_err("name is invalid");
    assert_eq!(err.to_string(), "The table name 'bad;name' is invalid");
}

#[test]
fn quoted_table_escapes_quotes() {
    assert_eq!(table("Documents").quoted(), "['Documents']");
    assert_eq!(table("it's").quoted(), r"['it\'s']");
    assert_eq!(table(r"a\b").quoted(), r"['a\\b']");
}

#[test]
fn query_text_has_expected_shape() {
    let query = SimilarityQuery::new(table("Documents"), vec![1.0, 0.0], 5).expect("query is valid");
    let text = query.text();

    assert!(text.starts_with(
        "declare query_parameters(search_vector:dynamic, max_results:long);"
    ));
    assert!(text.contains("let series_cosine_similarity_fl=(vec1:dynamic, vec2:dynamic)"));
    assert!(text.contains("dp/(v1l*v2l)"));
    assert!(text.contains("\n['Documents']\n"));
    assert!(text.contains(
        "| extend similarity = series_cosine_similarity_fl(search_vector, Embeddings)"
    ));
    assert!(text.contains("| top max_results by similarity desc"));
    assert!(text.ends_with("| project similarity, Id, Title, Text, Embeddings, Timestamp"));
}

#[test]
fn vector_values_are_parameters_not_text() {
    let query = SimilarityQuery::new(table("Documents"), vec![0.125, -0.75, 3.5], 7)
        .expect("query is valid");

    let text = query.text();
    assert!(!text.contains("0.125"));
    assert!(!text.contains("-0.75"));
    assert!(!text.contains('7'));

    let parameters = query.parameters();
    assert_eq!(
        parameters.get(VECTOR_PARAMETER).map(String::as_str),
        Some("dynamic([0.125,-0.75,3.5])")
    );
    assert_eq!(parameters.get(LIMIT_PARAMETER).map(String::as_str), Some("7"));
}

#[test]
fn zero_max_results_is_rejected() {
    assert!(matches!(
        SimilarityQuery::new(table("Documents"), vec![1.0], 0),
        Err(SearchError::InvalidRequest(_))
    ));
}

#[test]
fn max_results_beyond_long_is_rejected() {
    assert!(SimilarityQuery::new(table("Documents"), vec![1.0], i64::MAX as usize).is_ok());

    let result = SimilarityQuery::new(table("Documents"), vec![1.0], usize::MAX);
    assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
}

#[test]
fn bad_vectors_are_rejected() {
    assert!(matches!(
        SimilarityQuery::new(table("Documents"), Vec::new(), 3),
        Err(SearchError::InvalidEmbedding(_))
    ));
    assert!(matches!(
        SimilarityQuery::new(table("Documents"), vec![f32::NAN], 3),
        Err(SearchError::InvalidEmbedding(_))
    ));
}

#[test]
fn from_request_checks_table_before_vector() {
    let request = SearchRequest::new(ConnectionInfo::new("Docs", "bad name"), Vec::new(), 0);
    assert!(matches!(
        SimilarityQuery::from_request(&request),
        Err(SearchError::InvalidTableName(_))
    ));

    let request = SearchRequest::new(ConnectionInfo::new("Docs", " Documents "), vec![0.5], 3);
    let query = SimilarityQuery::from_request(&request).expect("request is valid");
    assert_eq!(query.table().as_str(), "Documents");
    assert_eq!(query.vector(), &[0.5]);
    assert_eq!(query.max_results(), 3);
}

struct CannedClient {
    rows: Vec<Vec<Value>>,
    seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl StoreClient for CannedClient {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl QueryClient for CannedClient {
    async fn execute_query(
        &self,
        database: &str,
        query: &SimilarityQuery,
        _properties: &RequestProperties,
    ) -> Result<RowStream> {
        self.seen
            .lock()
            .expect("lock is not poisoned")
            .push((database.to_string(), query.table().to_string()));

        let columns: Arc<[String]> = PROJECTED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows: Vec<Result<QueryRow>> = self
            .rows
            .iter()
            .map(|values| Ok(QueryRow::new(Arc::clone(&columns), values.clone())))
            .collect();
        Ok(futures::stream::iter(rows).boxed())
    }
}

fn row(similarity: f64, title: &str, text: &str) -> Vec<Value> {
    vec![
        json!(similarity),
        json!("id"),
        json!(title),
        json!(text),
        json!([1.0, 0.0]),
        json!("2024-01-01T00:00:00Z"),
    ]
}

#[tokio::test]
async fn results_keep_store_order() {
    let client = CannedClient {
        rows: vec![row(0.99, "row3", "third"), row(0.9, "row1", "first")],
        seen: Mutex::new(Vec::new()),
    };
    let query = SimilarityQuery::new(table("Documents"), vec![1.0, 0.0], 2).expect("query is valid");

    let response = run_similarity_query(&client, "Catalog", &query, &RequestProperties::new())
        .await
        .expect("query succeeds");

    assert_eq!(
        response.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
        vec!["row3", "row1"]
    );
    assert_eq!(response.results[0].text, "third");
    assert_eq!(
        client.seen.lock().expect("lock is not poisoned").as_slice(),
        &[("Catalog".to_string(), "Documents".to_string())]
    );
}

#[tokio::test]
async fn empty_cursor_gives_empty_response() {
    let client = CannedClient {
        rows: Vec::new(),
        seen: Mutex::new(Vec::new()),
    };
    let query = SimilarityQuery::new(table("Documents"), vec![1.0], 4).expect("query is valid");

    let response = run_similarity_query(&client, "Catalog", &query, &RequestProperties::new())
        .await
        .expect("query succeeds");
    assert!(response.is_empty());
}

#[tokio::test]
async fn huge_capacity_hint_does_not_preallocate() {
    let rows: RowStream = futures::stream::empty::<Result<QueryRow>>().boxed();

    let results = collect_results(rows, usize::MAX)
        .await
        .expect("empty cursor collects");
    assert!(results.is_empty());
    assert!(results.capacity() <= MAX_CAPACITY_HINT);
}

#[tokio::test]
async fn large_limit_with_few_rows_returns_them_all() {
    let client = CannedClient {
        rows: vec![row(0.9, "only", "single row")],
        seen: Mutex::new(Vec::new()),
    };
    let query = SimilarityQuery::new(table("Documents"), vec![1.0], 10_000_000_000)
        .expect("query is valid");

    let response = run_similarity_query(&client, "Catalog", &query, &RequestProperties::new())
        .await
        .expect("query succeeds");
    assert_eq!(response.len(), 1);
    assert_eq!(
        query.parameters().get(LIMIT_PARAMETER).map(String::as_str),
        Some("10000000000")
    );
}

#[tokio::test]
async fn non_string_title_is_a_query_error() {
    let mut bad = row(0.5, "ignored", "text");
    bad[2] = json!(42);
    let client = CannedClient {
        rows: vec![bad],
        seen: Mutex::new(Vec::new()),
    };
    let query = SimilarityQuery::new(table("Documents"), vec![1.0], 4).expect("query is valid");

    let result = run_similarity_query(&client, "Catalog", &query, &RequestProperties::new()).await;
    assert!(matches!(result, Err(SearchError::BackendQuery(_))));
}
