// ============================================================================
// updown Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod presentation;
pub mod storage;

// Re-export main types for convenience
pub use connection::{StoreBackend, StoreConfig, open_store};
pub use crate::core::{PersistError, Result};
pub use presentation::{
    Lifecycle, Presentation, PresentationRepository, PresentationStream, derive_key,
};
pub use storage::{
    DocumentQuery, DocumentStore, FileDocumentStore, InMemoryDocumentStore, Revision,
    ScanConsistency, StoredDocument,
};

use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Handle on a bucket of presentations
///
/// Owns the storage collaborator and hands out repositories bound to it.
///
/// # Examples
///
/// ```
/// use updown::{Client, Presentation, StoreConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::open(StoreConfig::new("default")).await?;
/// client.setup_indexes().await?;
///
/// let saved = client
///     .presentations()
///     .save(&Presentation::with_title("My Talk"))
///     .await?;
/// assert_eq!(saved.id(), Some("p::my_talk"));
///
/// let all = client.presentations().list().await?;
/// assert_eq!(all.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn DocumentStore>,
    presentations: PresentationRepository,
}

impl Client {
    /// Open the store described by a configuration
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = open_store(&config).await?;
        Ok(Self::with_store(store))
    }

    /// Open using a connection string (`memory://<bucket>` or `file://<path>`)
    pub async fn open_url(url: &str) -> Result<Self> {
        Self::open(StoreConfig::from_url(url)?).await
    }

    /// Wrap an existing store, e.g. a test double
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        let presentations = PresentationRepository::new(store.clone());
        Self {
            store,
            presentations,
        }
    }

    pub fn presentations(&self) -> &PresentationRepository {
        &self.presentations
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Provision the primary index; a failure here should abort startup
    pub async fn setup_indexes(&self) -> Result<()> {
        self.presentations.setup_indexes().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_open_url() {
        let client = Client::open_url("memory://talks").await.unwrap();
        assert_eq!(client.store().bucket(), "talks");
    }

    #[tokio::test]
    async fn test_client_save_and_find() {
        let client = Client::open(StoreConfig::default()).await.unwrap();
        client.setup_indexes().await.unwrap();

        let saved = client
            .presentations()
            .save(&Presentation::with_title("Hello World"))
            .await
            .unwrap();
        let found = client.presentations().find("p::hello_world").await.unwrap();
        assert_eq!(found.title(), saved.title());
        assert_eq!(found.revision(), saved.revision());
    }

    #[tokio::test]
    async fn test_client_with_shared_store() {
        let store = Arc::new(InMemoryDocumentStore::new("shared"));
        let first = Client::with_store(store.clone());
        let second = Client::with_store(store.clone());

        first
            .presentations()
            .save(&Presentation::with_title("Shared"))
            .await
            .unwrap();
        assert!(second.presentations().find("p::shared").await.is_ok());
        assert_eq!(store.write_count(), 1);
    }
}
