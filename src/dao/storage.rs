use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend failure surfaced to the persistence writer and the storage supervisor.
///
/// Every variant is treated as transient: the writer keeps the change queued.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} unavailable: {source}")]
    Unavailable {
        backend: &'static str,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a `backend` failure.
    pub fn unavailable(
        backend: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        StorageError::Unavailable {
            backend,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_backend_and_cause() {
        let err = StorageError::unavailable("memory", "write refused");
        assert_eq!(err.to_string(), "memory unavailable: write refused");
        assert!(err.source().is_some());
    }
}
