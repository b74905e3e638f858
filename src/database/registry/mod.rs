// Lazily created, process-lifetime store clients
// One query client and one ingest client per logical connection name. The
// cache-hit path only takes a read lock. On a miss the client is built
// outside any lock and then inserted if absent, so two callers missing on
// the same name at once may both build a client; only the first insert
// survives and the other candidate is closed straight away.


use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ConnectionDescriptor;
use super::{ClientFactory, IngestClient, QueryClient, StoreClient};
use crate::config::NameResolver;
use crate::{Result, SearchError};

/// A live client together with the connection it was built from
pub struct ClientHandle<C: ?Sized> {
    pub client: Arc<C>,
    pub descriptor: ConnectionDescriptor,
}

/// Outcome of closing every cached client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub closed: usize,
    pub failed: usize,
}

impl ShutdownSummary {
    #[inline]
    pub fn attempted(&self) -> usize {
        self.closed + self.failed
    }
}

struct ClientCache<C: ?Sized> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<ClientHandle<C>>>>,
}

impl<C: ?Sized + StoreClient> ClientCache<C> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, name: &str) -> Option<Arc<ClientHandle<C>>> {
        self.entries.read().await.get(name).cloned()
    }

    /// Insert `candidate` unless another caller got there first
    async fn install(&self, name: &str, candidate: ClientHandle<C>) -> Arc<ClientHandle<C>> {
        let candidate = Arc::new(candidate);
        let (winner, loser) = {
            let mut entries = self.entries.write().await;
            match entries.entry(name.to_string()) {
                Entry::Occupied(existing) => (Arc::clone(existing.get()), Some(candidate)),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&candidate));
                    (candidate, None)
                }
            }
        };

        if let Some(loser) = loser {
            debug!(
                "Another caller created the {} client for '{}' first, closing ours",
                self.kind, name
            );
            if let Err(e) = loser.client.close().await {
                warn!(
                    "Failed to close redundant {} client for '{}': {}",
                    self.kind, name, e
                );
            }
        } else {
            info!("Created {} client for connection '{}'", self.kind, name);
        }

        winner
    }

    async fn drain(&self) -> Vec<(String, Arc<ClientHandle<C>>)> {
        self.entries.write().await.drain().collect()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn close_all(&self, summary: &mut ShutdownSummary) {
        for (name, handle) in self.drain().await {
            match handle.client.close().await {
                Ok(()) => {
                    debug!("Closed {} client for '{}'", self.kind, name);
                    summary.closed += 1;
                }
                Err(e) => {
                    warn!("Failed to close {} client for '{}': {}", self.kind, name, e);
                    summary.failed += 1;
                }
            }
        }
    }
}

/// Resolves connection names to cached query and ingest clients
pub struct ConnectionRegistry {
    resolver: Arc<dyn NameResolver>,
    factory: Arc<dyn ClientFactory>,
    query_clients: ClientCache<dyn QueryClient>,
    ingest_clients: ClientCache<dyn IngestClient>,
}

impl ConnectionRegistry {
    #[inline]
    pub fn new(resolver: Arc<dyn NameResolver>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            resolver,
            factory,
            query_clients: ClientCache::new("query"),
            ingest_clients: ClientCache::new("ingest"),
        }
    }

    #[inline]
    pub async fn query_client(
        &self,
        connection_name: &str,
    ) -> Result<Arc<ClientHandle<dyn QueryClient>>> {
        if let Some(handle) = self.query_clients.get(connection_name).await {
            return Ok(handle);
        }

        let descriptor = self.resolve_descriptor(connection_name)?;
        let client = self.factory.create_query_client(&descriptor).await?;
        Ok(self
            .query_clients
            .install(connection_name, ClientHandle { client, descriptor })
            .await)
    }

    #[inline]
    pub async fn ingest_client(
        &self,
        connection_name: &str,
    ) -> Result<Arc<ClientHandle<dyn IngestClient>>> {
        if let Some(handle) = self.ingest_clients.get(connection_name).await {
            return Ok(handle);
        }

        let descriptor = self.resolve_descriptor(connection_name)?;
        let client = self.factory.create_ingest_client(&descriptor).await?;
        Ok(self
            .ingest_clients
            .install(connection_name, ClientHandle { client, descriptor })
            .await)
    }

    /// Number of cached (query, ingest) clients
    #[inline]
    pub async fn cached_clients(&self) -> (usize, usize) {
        (self.query_clients.len().await, self.ingest_clients.len().await)
    }

    /// Close every cached client; individual failures are logged and counted
    #[inline]
    pub async fn shutdown(&self) -> ShutdownSummary {
        let mut summary = ShutdownSummary::default();
        self.query_clients.close_all(&mut summary).await;
        self.ingest_clients.close_all(&mut summary).await;

        if summary.failed > 0 {
            warn!(
                "Closed {} store clients, {} failed to close",
                summary.closed, summary.failed
            );
        } else {
            debug!("Closed {} store clients", summary.closed);
        }
        summary
    }

    fn resolve_descriptor(&self, connection_name: &str) -> Result<ConnectionDescriptor> {
        let connection_string = self
            .resolver
            .resolve(connection_name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SearchError::Configuration(format!(
                    "No connection string named '{}' was found. It must be set in the \
                     [connections] table of config.toml or as an environment variable.",
                    connection_name
                ))
            })?;

        ConnectionDescriptor::parse(&connection_string)
    }
}
