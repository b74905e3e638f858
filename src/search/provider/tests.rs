use super::*;
use crate::config::ConfigNameResolver;
use crate::database::connection::ConnectionDescriptor;
use crate::database::{IngestClient, IngestTarget, QueryClient, QueryRow, RowStream, StoreClient};
use crate::search::ConnectionInfo;
use crate::search::query::PROJECTED_COLUMNS;
use arrow::record_batch::RecordBatch;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct FakeStore {
    hang: bool,
    queries: Mutex<Vec<(String, String, RequestProperties)>>,
    ingests: Mutex<Vec<(IngestTarget, usize)>>,
    closes: AtomicUsize,
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl QueryClient for FakeStore {
    async fn execute_query(
        &self,
        database: &str,
        query: &SimilarityQuery,
        properties: &RequestProperties,
    ) -> Result<RowStream> {
        self.queries.lock().expect("lock is not poisoned").push((
            database.to_string(),
            query.text(),
            properties.clone(),
        ));
        if self.hang {
            std::future::pending::<()>().await;
        }

        let columns: Arc<[String]> = PROJECTED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let row = |title: &str, text: &str| -> Result<QueryRow> {
            let values: Vec<Value> = vec![
                json!(0.5),
                json!("id"),
                json!(title),
                json!(text),
                json!([]),
                json!("2024-01-01T00:00:00Z"),
            ];
            Ok(QueryRow::new(Arc::clone(&columns), values))
        };
        let rows = vec![row("alpha", "first"), row("beta", "second")];
        Ok(futures::stream::iter(rows).boxed())
    }
}

#[async_trait]
impl IngestClient for FakeStore {
    async fn ingest(&self, target: &IngestTarget, batch: RecordBatch) -> Result<()> {
        self.ingests
            .lock()
            .expect("lock is not poisoned")
            .push((target.clone(), batch.num_rows()));
        Ok(())
    }
}

struct FakeFactory {
    store: Arc<FakeStore>,
    created: AtomicUsize,
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn create_query_client(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.store) as Arc<dyn QueryClient>)
    }

    async fn create_ingest_client(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn IngestClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.store) as Arc<dyn IngestClient>)
    }
}

fn provider_with(store: FakeStore) -> (StoreSearchProvider, Arc<FakeStore>, Arc<FakeFactory>) {
    let mut config = Config::default();
    config.connections.insert(
        "Docs".to_string(),
        "Data Source=https://docs.kusto.example.net;Initial Catalog=Library".to_string(),
    );

    let store = Arc::new(store);
    let factory = Arc::new(FakeFactory {
        store: Arc::clone(&store),
        created: AtomicUsize::new(0),
    });
    let provider = StoreSearchProvider::new(
        Arc::new(ConfigNameResolver::new(&config)),
        Arc::clone(&factory) as Arc<dyn ClientFactory>,
    );
    (provider, store, factory)
}

fn request(collection: &str) -> SearchRequest {
    SearchRequest::new(ConnectionInfo::new("Docs", collection), vec![1.0, 0.0], 2)
}

fn document() -> SearchableDocument {
    SearchableDocument::new("notes/setup.md", ConnectionInfo::new("Docs", "Documents"))
        .with_chunk("one", vec![0.1, 0.2])
        .with_chunk("two", vec![0.3, 0.4])
}

#[tokio::test]
async fn search_uses_descriptor_catalog() {
    let (provider, store, _) = provider_with(FakeStore::default());

    let response = provider.search(request("Documents")).await.expect("search succeeds");

    assert_eq!(
        response.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
        vec!["alpha", "beta"]
    );
    let queries = store.queries.lock().expect("lock is not poisoned");
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0, "Library");
    assert!(queries[0].1.contains("['Documents']"));
}

#[tokio::test]
async fn invalid_table_is_rejected_before_any_backend_call() {
    let (provider, store, factory) = provider_with(FakeStore::default());

    for collection in ["", "  ", "a/b", "x;y", "two words"] {
        let result = provider.search(request(collection)).await;
        assert!(
            matches!(result, Err(SearchError::InvalidTableName(_))),
            "'{}' should be rejected",
            collection
        );
    }

    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    assert!(store.queries.lock().expect("lock is not poisoned").is_empty());
}

#[tokio::test]
async fn unknown_connection_is_a_configuration_error() {
    let (provider, _, _) = provider_with(FakeStore::default());
    let request = SearchRequest::new(ConnectionInfo::new("Missing", "Documents"), vec![1.0], 1);

    assert!(matches!(
        provider.search(request).await,
        Err(SearchError::Configuration(_))
    ));
}

#[tokio::test]
async fn server_timeout_is_sent_with_queries() {
    let (provider, store, _) = provider_with(FakeStore::default());
    let provider = provider.with_server_timeout(Duration::from_secs(90));

    provider.search(request("Documents")).await.expect("search succeeds");

    let queries = store.queries.lock().expect("lock is not poisoned");
    assert_eq!(
        queries[0].2.options.get("servertimeout"),
        Some(&json!("00:01:30"))
    );
}

#[tokio::test]
async fn add_document_ingests_into_catalog() {
    let (provider, store, _) = provider_with(FakeStore::default());

    provider
        .add_document(document(), &CancellationToken::new())
        .await
        .expect("ingest succeeds");

    let ingests = store.ingests.lock().expect("lock is not poisoned");
    assert_eq!(
        ingests.as_slice(),
        &[(
            IngestTarget {
                database: "Library".to_string(),
                table: "Documents".to_string(),
            },
            2
        )]
    );
}

#[tokio::test]
async fn cancelled_add_document_sends_nothing() {
    let (provider, store, _) = provider_with(FakeStore::default());
    let token = CancellationToken::new();
    token.cancel();

    let result = provider.add_document(document(), &token).await;

    assert!(matches!(result, Err(SearchError::Cancelled)));
    assert!(store.ingests.lock().expect("lock is not poisoned").is_empty());
}

#[tokio::test]
async fn cancelled_search_is_not_dispatched() {
    let (provider, store, factory) = provider_with(FakeStore::default());
    let token = CancellationToken::new();
    token.cancel();

    let result = provider
        .search_with_cancellation(request("Documents"), &token)
        .await;

    assert!(matches!(result, Err(SearchError::Cancelled)));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    assert!(store.queries.lock().expect("lock is not poisoned").is_empty());
}

#[tokio::test]
async fn in_flight_search_stops_on_cancel() {
    let (provider, store, _) = provider_with(FakeStore {
        hang: true,
        ..FakeStore::default()
    });
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            while store.queries.lock().expect("lock is not poisoned").is_empty() {
                tokio::task::yield_now().await;
            }
            token.cancel();
        })
    };

    let result = provider
        .search_with_cancellation(request("Documents"), &token)
        .await;
    canceller.await.expect("canceller finishes");

    assert!(matches!(result, Err(SearchError::Cancelled)));
}

#[tokio::test]
async fn shutdown_closes_cached_clients_once() {
    let (provider, store, _) = provider_with(FakeStore::default());

    provider.search(request("Documents")).await.expect("search succeeds");
    provider
        .add_document(document(), &CancellationToken::new())
        .await
        .expect("ingest succeeds");
    assert_eq!(provider.registry().cached_clients().await, (1, 1));

    let summary = provider.shutdown().await;
    assert_eq!(summary.closed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.closes.load(Ordering::SeqCst), 2);

    assert_eq!(provider.shutdown().await.attempted(), 0);
}
