pub mod config;

pub use config::{StoreBackend, StoreConfig};

use crate::core::Result;
use crate::storage::{DocumentStore, FileDocumentStore, InMemoryDocumentStore};
use std::sync::Arc;
use tracing::debug;

/// Opens the document store a configuration points at.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    config.validate()?;
    debug!(url = %config.to_url(), "opening document store");

    let store: Arc<dyn DocumentStore> = match &config.backend {
        StoreBackend::Memory => Arc::new(InMemoryDocumentStore::new(config.bucket.as_str())),
        StoreBackend::File(path) => Arc::new(FileDocumentStore::open(path, &config.bucket).await?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store(&StoreConfig::new("talks")).await.unwrap();
        assert_eq!(store.bucket(), "talks");
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        assert!(open_store(&StoreConfig::new("")).await.is_err());
    }
}
