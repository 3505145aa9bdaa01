use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by indexing, refresh and query operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// No indexer has been registered; the caller cannot proceed until one is.
    #[error("no indexer registered")]
    ServiceUnavailable,

    #[error("invalid analyzer language code: {0:?}")]
    InvalidLanguage(String),

    #[error("index I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A failed recreation left no usable index at this location; a
    /// successful recreate or a restart is needed.
    #[error("index at {} is unavailable after a failed recreate", path.display())]
    DirectoryUnavailable { path: PathBuf },

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    #[error("schema missing expected field: {0}")]
    FieldNotFound(String),

    #[error(transparent)]
    Source(#[from] anyhow::Error),

    #[error("index state serialization failed: {0}")]
    State(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a later attempt (typically a full reindex) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexError::ServiceUnavailable
                | IndexError::Io { .. }
                | IndexError::DirectoryUnavailable { .. }
                | IndexError::Tantivy(_)
                | IndexError::Source(_)
        )
    }
}
