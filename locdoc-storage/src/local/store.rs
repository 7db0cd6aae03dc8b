//! Durable persistence for one local document namespace.

use std::sync::Arc;

use locdoc_core::{
    LocalDocumentError, LocalDocumentId, LocalDocumentRecord, LocdocResult, NamespaceKey,
    NamespaceKind, StorageError,
};

use crate::backend::StorageBackend;

/// Local document records of one namespace.
///
/// Records are stored as JSON. The store never looks inside `data`.
#[derive(Clone)]
pub struct LocalDocumentStore {
    backend: Arc<dyn StorageBackend>,
    namespace: NamespaceKey,
}

impl LocalDocumentStore {
    /// Create a store for the local namespace of `owner`.
    ///
    /// The kind of `owner` is ignored: a local document store always writes
    /// to [`NamespaceKind::Local`], never into the owner's queryable documents.
    pub fn new(backend: Arc<dyn StorageBackend>, owner: &NamespaceKey) -> Self {
        Self {
            backend,
            namespace: owner.with_kind(NamespaceKind::Local),
        }
    }

    pub fn namespace(&self) -> &NamespaceKey {
        &self.namespace
    }

    /// Load a record. `None` if absent.
    pub async fn find(&self, id: &LocalDocumentId) -> LocdocResult<Option<LocalDocumentRecord>> {
        match self.backend.get(&self.namespace, id.as_str()).await? {
            Some(bytes) => Ok(Some(decode(id.as_str(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a record, replacing the previous data entirely.
    pub async fn save(&self, record: &LocalDocumentRecord) -> LocdocResult<()> {
        let bytes = encode(record)?;
        self.backend
            .put(&self.namespace, record.id.as_str(), &bytes)
            .await
    }

    /// Write a record that must not exist yet.
    ///
    /// Fails with `AlreadyExists` if any writer created the id first.
    pub async fn create(&self, record: &LocalDocumentRecord) -> LocdocResult<()> {
        let bytes = encode(record)?;
        let created = self
            .backend
            .put_if_absent(&self.namespace, record.id.as_str(), &bytes)
            .await?;
        if !created {
            return Err(LocalDocumentError::AlreadyExists {
                namespace: self.namespace.to_string(),
                id: record.id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Delete a record. Returns whether one existed.
    pub async fn remove(&self, id: &LocalDocumentId) -> LocdocResult<bool> {
        self.backend.delete(&self.namespace, id.as_str()).await
    }

    /// Every record of the namespace, ordered by id.
    pub async fn list(&self) -> LocdocResult<Vec<LocalDocumentRecord>> {
        self.backend
            .list(&self.namespace)
            .await?
            .into_iter()
            .map(|(id, bytes)| decode(&id, &bytes))
            .collect()
    }

    /// Delete every record of the namespace.
    pub async fn clear(&self) -> LocdocResult<u64> {
        self.backend.clear(&self.namespace).await
    }
}

fn encode(record: &LocalDocumentRecord) -> LocdocResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| {
        StorageError::Serialization {
            id: record.id.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode(id: &str, bytes: &[u8]) -> LocdocResult<LocalDocumentRecord> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::Deserialization {
            id: id.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
