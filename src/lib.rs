use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("The table name '{0}' is invalid")]
    InvalidTableName(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Ingestion failed: {0}")]
    BackendIngest(String),

    #[error("Query failed: {0}")]
    BackendQuery(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for SearchError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod search;
