use thiserror::Error;
use waystone_events::{PluginError, StorageError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("{path} could not be loaded, refusing to overwrite it")]
    Unreadable { path: String },

    #[error("No world loaded yet")]
    NotLoaded,
}

impl From<PersistError> for PluginError {
    fn from(e: PersistError) -> Self {
        PluginError::ExecutionError(e.to_string())
    }
}

/// A player already holds more homes than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("home limit of {max} reached")]
pub struct HomeLimitReached {
    pub max: i64,
}
