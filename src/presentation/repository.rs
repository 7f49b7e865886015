use super::codec::{self, PRESENTATION_TYPE};
use super::entity::Presentation;
use super::key::{WriteTarget, resolve_write_target};
use crate::core::{PersistError, Result};
use crate::storage::{
    DocumentQuery, DocumentStore, Filter, ScanConsistency, Sort, SortExpr, StoredDocument,
};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// One-shot stream of presentations in `createdAt` order.
pub type PresentationStream = BoxStream<'static, Result<Presentation>>;

/// Saves, fetches and lists presentations through a [`DocumentStore`].
#[derive(Clone)]
pub struct PresentationRepository {
    store: Arc<dyn DocumentStore>,
}

impl PresentationRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Persists a presentation and returns its synchronized successor.
    ///
    /// A clean presentation comes back unchanged without touching storage.
    /// On failure the caller's copy is untouched and still dirty.
    pub async fn save(&self, presentation: &Presentation) -> Result<Presentation> {
        if !presentation.is_dirty() {
            debug!(id = presentation.id(), "presentation is clean, skipping write");
            return Ok(presentation.clone());
        }

        let target = resolve_write_target(presentation)?;
        let content = codec::encode(presentation)?;
        let span = info_span!("save_presentation", id = target.id());

        async {
            let written = match &target {
                WriteTarget::Replace(revision) => self.store.update(revision, content.clone()).await,
                WriteTarget::Insert(id) => self.store.create(id, content.clone()).await,
            };
            let revision = written.inspect_err(|err| {
                warn!(error = %err, "presentation save failed");
            })?;
            debug!(cas = revision.cas(), "presentation saved");
            codec::decode(StoredDocument::new(revision, content)).map(Presentation::into_synchronized)
        }
        .instrument(span)
        .await
    }

    pub async fn find(&self, id: &str) -> Result<Presentation> {
        let document = self.store.get(id).await?;
        codec::decode(document)
    }

    /// The query behind [`Self::find_all`].
    pub fn find_all_query() -> DocumentQuery {
        DocumentQuery::new()
            .filter(Filter::eq("type", PRESENTATION_TYPE))
            .order_by(Sort::asc(SortExpr::Timestamp("createdAt".to_string())))
            .consistency(ScanConsistency::RequestPlus)
    }

    /// Streams every presentation, oldest first, including all acknowledged writes.
    ///
    /// Relies on the primary index; call [`Self::setup_indexes`] at startup.
    pub async fn find_all(&self) -> Result<PresentationStream> {
        let query = Self::find_all_query();
        debug!(
            statement = %query.statement(self.store.bucket()),
            consistency = query.consistency.as_str(),
            "listing presentations"
        );
        let rows = self.store.query(&query).await?;
        Ok(rows.map(|row| row.and_then(codec::decode)).boxed())
    }

    pub async fn list(&self) -> Result<Vec<Presentation>> {
        self.find_all().await?.try_collect().await
    }

    /// Creates the primary index, tolerating one that already exists.
    ///
    /// Any other failure is a `Provisioning` error and should abort startup.
    pub async fn setup_indexes(&self) -> Result<()> {
        let bucket = self.store.bucket();
        match self.store.ensure_primary_index().await {
            Ok(()) => {
                info!(bucket, "primary index created");
                Ok(())
            }
            Err(PersistError::IndexExists(message)) => {
                debug!(bucket, %message, "primary index already present");
                Ok(())
            }
            Err(PersistError::Provisioning(message)) => Err(PersistError::Provisioning(message)),
            Err(err) => Err(PersistError::Provisioning(format!(
                "Couldn't create primary index on '{}': {}",
                bucket, err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::Lifecycle;
    use crate::storage::InMemoryDocumentStore;

    fn repository() -> (Arc<InMemoryDocumentStore>, PresentationRepository) {
        let store = Arc::new(InMemoryDocumentStore::new("default"));
        let repository = PresentationRepository::new(store.clone());
        (store, repository)
    }

    #[tokio::test]
    async fn test_save_new_derives_key_and_synchronizes() {
        let (store, repository) = repository();
        let draft = Presentation::with_title("My Talk");

        let saved = repository.save(&draft).await.unwrap();
        assert_eq!(saved.id(), Some("p::my_talk"));
        assert!(!saved.is_dirty());
        assert_eq!(saved.lifecycle(), Lifecycle::Synchronized);
        assert!(saved.revision().unwrap().is_versioned());
        assert_eq!(store.write_count(), 1);

        // The draft itself is untouched.
        assert!(draft.is_dirty());
        assert_eq!(draft.id(), None);
    }

    #[tokio::test]
    async fn test_clean_save_is_noop() {
        let (store, repository) = repository();
        let saved = repository.save(&Presentation::with_title("Once")).await.unwrap();
        let again = repository.save(&saved).await.unwrap();
        assert_eq!(again, saved);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_title_fails_without_write() {
        let (store, repository) = repository();
        let err = repository.save(&Presentation::new()).await.unwrap_err();
        assert!(matches!(err, PersistError::Validation(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_find_all_query_shape() {
        let query = PresentationRepository::find_all_query();
        assert_eq!(query.consistency, ScanConsistency::RequestPlus);
        assert_eq!(query.filter, Filter::eq("type", "presentation"));
        assert_eq!(query.order, vec![Sort::asc(SortExpr::Timestamp("createdAt".into()))]);
    }

    #[tokio::test]
    async fn test_setup_indexes_is_idempotent() {
        let (store, repository) = repository();
        repository.setup_indexes().await.unwrap();
        repository.setup_indexes().await.unwrap();
        assert!(store.has_primary_index().await);
    }

    #[tokio::test]
    async fn test_setup_indexes_failure_is_provisioning() {
        let (store, repository) = repository();
        store.set_available(false);
        let err = repository.setup_indexes().await.unwrap_err();
        assert!(matches!(err, PersistError::Provisioning(_)));
        assert!(!err.is_recoverable());
    }
}
