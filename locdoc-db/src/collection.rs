//! Collections: regular documents plus a collection-scoped local namespace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use locdoc_core::{
    ChangeEvent, ChangeKind, DatabaseError, DocumentData, DocumentRecord, InstanceToken,
    LocdocResult, NamespaceKey, NamespaceKind, StorageError, ValidationError,
};
use locdoc_storage::{LocalDocumentCache, LocalDocumentStore, StorageBackend};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::database::DatabaseInner;
use crate::local::LocalDocuments;

/// A named set of regular documents.
///
/// Regular documents live in the collection's documents namespace. Local
/// documents of the collection live in a separate namespace, so `find`,
/// `find_one`, `count` and the change stream never see them.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    name: String,
    database: Weak<DatabaseInner>,
    database_name: String,
    backend: Arc<dyn StorageBackend>,
    token: InstanceToken,
    documents: NamespaceKey,
    local: LocalDocumentCache,
    changes: broadcast::Sender<ChangeEvent>,
    destroyed: AtomicBool,
}

impl Collection {
    pub(crate) fn new(
        database: Weak<DatabaseInner>,
        database_name: &str,
        name: &str,
        backend: Arc<dyn StorageBackend>,
        token: InstanceToken,
        change_buffer: usize,
    ) -> Self {
        let documents = NamespaceKey::collection(database_name, name, NamespaceKind::Documents);
        let local = LocalDocumentCache::new(
            LocalDocumentStore::new(Arc::clone(&backend), &documents),
            change_buffer,
        );
        let (changes, _) = broadcast::channel(change_buffer.max(1));

        Self {
            inner: Arc::new(CollectionInner {
                name: name.to_string(),
                database,
                database_name: database_name.to_string(),
                backend,
                token,
                documents,
                local,
                changes,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn database_name(&self) -> &str {
        &self.inner.database_name
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Insert a regular document.
    ///
    /// Fails with `StorageError::DocumentExists` if the id is taken.
    pub async fn insert(
        &self,
        id: impl Into<String>,
        data: DocumentData,
    ) -> LocdocResult<DocumentRecord> {
        self.ensure_alive()?;
        let record = DocumentRecord::new(id, data);
        if record.id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }

        let bytes = serde_json::to_vec(&record).map_err(|e| StorageError::Serialization {
            id: record.id.clone(),
            reason: e.to_string(),
        })?;
        let created = self
            .inner
            .backend
            .put_if_absent(&self.inner.documents, &record.id, &bytes)
            .await?;
        if !created {
            return Err(StorageError::DocumentExists {
                namespace: self.inner.documents.to_string(),
                id: record.id,
            }
            .into());
        }

        debug!(collection = %self.inner.name, id = %record.id, "Inserted document");
        self.publish(ChangeEvent {
            collection: self.inner.name.clone(),
            id: record.id.clone(),
            kind: ChangeKind::Insert,
            data: Some(record.data.clone()),
            token: self.inner.token,
            occurred_at: Utc::now(),
        });
        Ok(record)
    }

    /// All regular documents, ordered by id.
    pub async fn find(&self) -> LocdocResult<Vec<DocumentRecord>> {
        self.ensure_alive()?;
        self.inner
            .backend
            .list(&self.inner.documents)
            .await?
            .into_iter()
            .map(|(id, bytes)| decode_document(id, &bytes))
            .collect()
    }

    /// First regular document by id, if any.
    pub async fn find_one(&self) -> LocdocResult<Option<DocumentRecord>> {
        Ok(self.find().await?.into_iter().next())
    }

    pub async fn count(&self) -> LocdocResult<usize> {
        self.ensure_alive()?;
        Ok(self.inner.backend.list(&self.inner.documents).await?.len())
    }

    /// Subscribe to regular document changes.
    pub fn changes(&self) -> LocdocResult<broadcast::Receiver<ChangeEvent>> {
        self.ensure_alive()?;
        Ok(self.inner.changes.subscribe())
    }

    /// Delete the collection with all of its documents and local documents.
    ///
    /// Returns the number of durable records deleted.
    pub async fn remove(&self) -> LocdocResult<u64> {
        self.ensure_alive()?;
        self.close().await?;

        let documents = self.inner.backend.clear(&self.inner.documents).await?;
        let local = self.inner.local.store().clear().await?;

        if let Some(database) = self.inner.database.upgrade() {
            database.forget_collection(&self.inner.name)?;
        }
        debug!(
            collection = %self.inner.name,
            documents,
            local,
            "Removed collection"
        );
        Ok(documents + local)
    }

    /// Mark destroyed and drop cached local handles. Durable data stays.
    pub(crate) async fn close(&self) -> LocdocResult<()> {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        if !self.inner.local.is_closed() {
            self.inner.local.close().await?;
        }
        Ok(())
    }

    fn ensure_alive(&self) -> LocdocResult<()> {
        if self.is_destroyed() {
            return Err(DatabaseError::CollectionDestroyed {
                name: self.inner.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        if self.inner.changes.send(event).is_err() {
            trace!(collection = %self.inner.name, "No change subscribers");
        }
    }
}

fn decode_document(id: String, bytes: &[u8]) -> LocdocResult<DocumentRecord> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::Deserialization {
            id,
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl LocalDocuments for Collection {
    fn local_documents(&self) -> LocdocResult<&LocalDocumentCache> {
        self.ensure_alive()?;
        Ok(&self.inner.local)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("database", &self.inner.database_name)
            .field("name", &self.inner.name)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
