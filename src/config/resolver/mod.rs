// Connection name resolution
// Maps a logical connection name (as written on a request) to the store
// connection string configured for it. Empty values count as unresolved.


use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::Config;

pub trait NameResolver: Send + Sync {
    /// Look up the connection string for `name`
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Resolves names from process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvNameResolver;

impl NameResolver for EnvNameResolver {
    #[inline]
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Resolves names from the `[connections]` table of the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigNameResolver {
    connections: BTreeMap<String, String>,
}

impl ConfigNameResolver {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            connections: config.connections.clone(),
        }
    }
}

impl NameResolver for ConfigNameResolver {
    #[inline]
    fn resolve(&self, name: &str) -> Option<String> {
        self.connections
            .get(name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Tries each resolver in order and returns the first non-empty answer
#[derive(Clone, Default)]
pub struct LayeredResolver {
    layers: Vec<Arc<dyn NameResolver>>,
}

impl LayeredResolver {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Config file entries first, then environment variables
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_layer(Arc::new(ConfigNameResolver::new(config)))
            .with_layer(Arc::new(EnvNameResolver))
    }

    #[inline]
    #[must_use]
    pub fn with_layer(mut self, layer: Arc<dyn NameResolver>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl NameResolver for LayeredResolver {
    #[inline]
    fn resolve(&self, name: &str) -> Option<String> {
        let resolved = self.layers.iter().find_map(|layer| layer.resolve(name));
        if resolved.is_none() {
            debug!("No resolver layer knows connection name '{}'", name);
        }
        resolved
    }
}
