//! Storage-level failures. Connectors wrap these into
//! `hopper_core::error::Error::Medium` together with their own name.

use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The adapter cannot address this kind of location.
    #[error("{adapter} cannot address '{location}'")]
    WrongLocation {
        adapter: &'static str,
        location: String,
    },

    #[error("remote store: {0}")]
    Remote(String),
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.into())
        } else {
            StorageError::Io {
                op,
                path: path.into(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
