// Store connection strings
// Connection strings are `key=value` pairs separated by `;`, in the style of
// Kusto connection strings:
//   Data Source=https://help.kusto.windows.net;Initial Catalog=Samples
//   https://help.kusto.windows.net/Samples;Application Token=...
//   Data Source=/var/lib/vectors;Database=docs
// Keys are case-insensitive. A leading segment without `=` is taken as the
// data source, and the first path segment of an HTTP data source doubles as
// the catalog when none is given explicitly.


use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::{Result, SearchError};

/// Catalog used when a connection string does not name one
pub const DEFAULT_CATALOG: &str = "NetDefaultDB";

const DATA_SOURCE_KEYS: &[&str] = &[
    "data source",
    "datasource",
    "addr",
    "address",
    "server",
    "network address",
    "cluster",
];
const CATALOG_KEYS: &[&str] = &["initial catalog", "database", "db"];

/// Parsed form of a store connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Cluster URL or storage location
    pub data_source: String,
    /// Database the connection targets
    pub initial_catalog: String,
    /// Every other key, lower-cased
    pub properties: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    #[inline]
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut data_source: Option<String> = None;
        let mut initial_catalog: Option<String> = None;
        let mut properties = BTreeMap::new();

        for (position, segment) in connection_string
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .enumerate()
        {
            let Some((key, value)) = segment.split_once('=') else {
                if position == 0 {
                    data_source = Some(unquote(segment).to_string());
                    continue;
                }
                return Err(SearchError::Configuration(format!(
                    "Malformed connection string segment '{}': expected key=value",
                    segment
                )));
            };

            let key = key.trim().to_lowercase();
            let value = unquote(value.trim()).to_string();

            if DATA_SOURCE_KEYS.contains(&key.as_str()) {
                data_source = Some(value);
            } else if CATALOG_KEYS.contains(&key.as_str()) {
                initial_catalog = Some(value);
            } else {
                properties.insert(key, value);
            }
        }

        let data_source = data_source
            .filter(|source| !source.is_empty())
            .ok_or_else(|| {
                SearchError::Configuration(
                    "Connection string does not specify a Data Source".to_string(),
                )
            })?;

        let (data_source, path_catalog) = split_catalog_from_url(data_source);
        let initial_catalog = initial_catalog
            .filter(|catalog| !catalog.is_empty())
            .or(path_catalog)
            .unwrap_or_else(|| DEFAULT_CATALOG.to_string());

        Ok(Self {
            data_source,
            initial_catalog,
            properties,
        })
    }

    /// Case-insensitive lookup of any non-standard key
    #[inline]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    /// Which backend the data source points at
    #[inline]
    pub fn store_kind(&self) -> Result<StoreKind> {
        StoreKind::from_data_source(&self.data_source)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    // Property values may hold tokens, so only their keys are printed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("data_source", &self.data_source)
            .field("initial_catalog", &self.initial_catalog)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Store backends a connection string can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Kusto cluster reached over its REST API
    Kusto,
    /// LanceDB dataset directory or object store prefix
    LanceDb,
}

impl StoreKind {
    #[inline]
    pub fn from_data_source(data_source: &str) -> Result<Self> {
        let Some((scheme, _)) = data_source.split_once("://") else {
            return Ok(Self::LanceDb);
        };

        match scheme.to_lowercase().as_str() {
            "http" | "https" => Ok(Self::Kusto),
            "file" | "s3" | "gs" | "az" | "memory" => Ok(Self::LanceDb),
            other => Err(SearchError::Configuration(format!(
                "Unsupported data source scheme '{}' in '{}'",
                other, data_source
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kusto => f.write_str("kusto"),
            Self::LanceDb => f.write_str("lancedb"),
        }
    }
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(value)
}

/// `https://cluster/Db` becomes (`https://cluster`, `Some("Db")`)
fn split_catalog_from_url(data_source: String) -> (String, Option<String>) {
    let Ok(mut url) = Url::parse(&data_source) else {
        return (data_source, None);
    };
    if !matches!(url.scheme(), "http" | "https") {
        return (data_source, None);
    }

    let catalog = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string);

    url.set_path("");
    url.set_query(None);
    (url.as_str().trim_end_matches('/').to_string(), catalog)
}
