//! Local document surface shared by databases and collections.

use async_trait::async_trait;
use locdoc_core::{DocumentData, LocalDocumentChange, LocalDocumentId, LocdocResult};
use locdoc_storage::{LocalDocumentCache, LocalDocumentHandle};
use tokio::sync::broadcast;

/// Owner of a local document namespace.
///
/// Implemented by [`Database`](crate::Database) and
/// [`Collection`](crate::Collection). The namespaces of a database and of each
/// of its collections are independent: the same id may exist in all of them.
#[async_trait]
pub trait LocalDocuments: Send + Sync {
    /// The owner's namespace. Fails once the owner was destroyed.
    fn local_documents(&self) -> LocdocResult<&LocalDocumentCache>;

    /// Create a local document.
    ///
    /// Fails with `AlreadyExists` if `id` is already present.
    async fn insert_local(
        &self,
        id: &str,
        data: DocumentData,
    ) -> LocdocResult<LocalDocumentHandle> {
        let id = LocalDocumentId::new(id)?;
        self.local_documents()?.insert(id, data).await
    }

    /// Look up a local document. `Ok(None)` if absent.
    async fn get_local(&self, id: &str) -> LocdocResult<Option<LocalDocumentHandle>> {
        let id = LocalDocumentId::new(id)?;
        self.local_documents()?.get(&id).await
    }

    /// Create a local document or replace the data of the existing one.
    async fn upsert_local(
        &self,
        id: &str,
        data: DocumentData,
    ) -> LocdocResult<LocalDocumentHandle> {
        let id = LocalDocumentId::new(id)?;
        self.local_documents()?.upsert(id, data).await
    }

    /// Subscribe to local document changes of this owner.
    fn local_changes(&self) -> LocdocResult<broadcast::Receiver<LocalDocumentChange>> {
        Ok(self.local_documents()?.subscribe())
    }
}
