//! Databases: collection registry plus a database-scoped local namespace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use locdoc_core::{
    new_instance_token, validate_name, DatabaseConfig, DatabaseError, InstanceToken, LocdocResult,
    NamespaceKey, NamespaceKind, StorageError,
};
use locdoc_storage::{open_backend, LocalDocumentCache, LocalDocumentStore, StorageBackend};
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::local::LocalDocuments;

/// A database instance.
///
/// Several instances may be opened on one backend. They share durable state
/// but each keeps its own collections, caches and change streams.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

pub(crate) struct DatabaseInner {
    name: String,
    backend: Arc<dyn StorageBackend>,
    token: InstanceToken,
    change_buffer: usize,
    local: LocalDocumentCache,
    collections: RwLock<HashMap<String, Collection>>,
    destroyed: AtomicBool,
}

impl DatabaseInner {
    pub(crate) fn forget_collection(&self, name: &str) -> LocdocResult<()> {
        self.collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(name);
        Ok(())
    }
}

impl Database {
    /// Open a database from configuration.
    pub fn open(config: DatabaseConfig) -> LocdocResult<Self> {
        config.validate()?;
        let backend = open_backend(&config.backend)?;
        Self::with_backend(config.name, backend, config.change_buffer)
    }

    /// Open a database on an existing backend.
    pub fn with_backend(
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        change_buffer: usize,
    ) -> LocdocResult<Self> {
        let name = name.into();
        validate_name("database", &name)?;

        let owner = NamespaceKey::database(name.as_str(), NamespaceKind::Local);
        let local = LocalDocumentCache::new(
            LocalDocumentStore::new(Arc::clone(&backend), &owner),
            change_buffer,
        );
        let token = new_instance_token();
        debug!(database = %name, token = %token, "Opened database");

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                name,
                backend,
                token,
                change_buffer,
                local,
                collections: RwLock::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identifies this instance in change events.
    pub fn token(&self) -> InstanceToken {
        self.inner.token
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.inner.backend
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Create a collection.
    ///
    /// Fails with `CollectionExists` if this instance already created one with
    /// the same name.
    pub fn collection(&self, name: &str) -> LocdocResult<Collection> {
        self.ensure_alive()?;
        validate_name("collection", name)?;

        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if collections.contains_key(name) {
            return Err(DatabaseError::CollectionExists {
                name: name.to_string(),
            }
            .into());
        }

        let collection = Collection::new(
            Arc::downgrade(&self.inner),
            &self.inner.name,
            name,
            Arc::clone(&self.inner.backend),
            self.inner.token,
            self.inner.change_buffer,
        );
        collections.insert(name.to_string(), collection.clone());
        debug!(database = %self.inner.name, collection = %name, "Created collection");
        Ok(collection)
    }

    pub fn get_collection(&self, name: &str) -> LocdocResult<Option<Collection>> {
        self.ensure_alive()?;
        Ok(self
            .inner
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(name)
            .cloned())
    }

    /// Names of the collections created on this instance, sorted.
    pub fn collection_names(&self) -> LocdocResult<Vec<String>> {
        let mut names: Vec<String> = self
            .inner
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    /// Close this instance.
    ///
    /// Every local document handle of the database and its collections becomes
    /// removed and later operations fail. Durable data is kept, so another
    /// instance opened on the same backend still sees it. Destroying twice is
    /// a no-op.
    ///
    /// Every namespace is closed even if closing one of them fails; the first
    /// error is returned afterwards.
    pub async fn destroy(&self) -> LocdocResult<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut result: LocdocResult<()> = Ok(());
        let collections: Vec<Collection> = match self.inner.collections.write() {
            Ok(mut registry) => registry.drain().map(|(_, c)| c).collect(),
            Err(poisoned) => {
                result = Err(StorageError::LockPoisoned.into());
                poisoned.into_inner().drain().map(|(_, c)| c).collect()
            }
        };

        for collection in &collections {
            if let Err(err) = collection.close().await {
                warn!(
                    database = %self.inner.name,
                    collection = %collection.name(),
                    error = %err,
                    "Failed to close collection"
                );
                result = result.and(Err(err));
            }
        }
        if let Err(err) = self.inner.local.close().await {
            warn!(database = %self.inner.name, error = %err, "Failed to close local namespace");
            result = result.and(Err(err));
        }

        debug!(
            database = %self.inner.name,
            collections = collections.len(),
            "Destroyed database"
        );
        result
    }

    /// Destroy this instance and delete all durable data of the database.
    ///
    /// Returns the number of durable records deleted.
    pub async fn remove(&self) -> LocdocResult<u64> {
        self.destroy().await?;
        let deleted = self.inner.backend.clear_database(&self.inner.name).await?;
        debug!(database = %self.inner.name, deleted, "Removed database");
        Ok(deleted)
    }

    fn ensure_alive(&self) -> LocdocResult<()> {
        if self.is_destroyed() {
            return Err(DatabaseError::Destroyed {
                name: self.inner.name.clone(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl LocalDocuments for Database {
    fn local_documents(&self) -> LocdocResult<&LocalDocumentCache> {
        self.ensure_alive()?;
        Ok(&self.inner.local)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("token", &self.inner.token)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locdoc_core::{document_data, LocdocError};
    use locdoc_storage::InMemoryBackend;
    use serde_json::json;

    fn memory_db(name: &str) -> Database {
        Database::open(DatabaseConfig::in_memory(name)).unwrap()
    }

    #[test]
    fn test_open_rejects_invalid_name() {
        let err = Database::open(DatabaseConfig::in_memory("Heroes")).unwrap_err();
        assert!(matches!(err, LocdocError::Config(_)));

        let err = Database::with_backend("", Arc::new(InMemoryBackend::new()), 8).unwrap_err();
        assert!(matches!(err, LocdocError::Validation(_)));
    }

    #[test]
    fn test_collection_registry() {
        let db = memory_db("heroes");
        let humans = db.collection("humans").unwrap();
        assert_eq!(humans.name(), "humans");
        assert_eq!(humans.database_name(), "heroes");

        let err = db.collection("humans").unwrap_err();
        assert!(matches!(
            err,
            LocdocError::Database(DatabaseError::CollectionExists { .. })
        ));

        assert!(db.get_collection("humans").unwrap().is_some());
        assert!(db.get_collection("villains").unwrap().is_none());
        assert_eq!(db.collection_names().unwrap(), vec!["humans".to_string()]);
    }

    #[test]
    fn test_collection_rejects_invalid_name() {
        let db = memory_db("heroes");
        let err = db.collection("Humans!").unwrap_err();
        assert!(matches!(err, LocdocError::Validation(_)));
    }

    #[tokio::test]
    async fn test_destroy_blocks_further_use() {
        let db = memory_db("heroes");
        let humans = db.collection("humans").unwrap();
        let handle = db
            .insert_local("foobar", document_data(json!({ "foo": "bar" })).unwrap())
            .await
            .unwrap();

        db.destroy().await.unwrap();
        db.destroy().await.unwrap();

        assert!(db.is_destroyed());
        assert!(handle.is_removed());
        assert!(humans.is_destroyed());
        assert!(matches!(
            db.get_local("foobar").await.unwrap_err(),
            LocdocError::Database(DatabaseError::Destroyed { .. })
        ));
        assert!(matches!(
            humans.find().await.unwrap_err(),
            LocdocError::Database(DatabaseError::CollectionDestroyed { .. })
        ));
        assert!(db.collection("villains").is_err());
    }

    #[tokio::test]
    async fn test_destroy_closes_everything_despite_poisoned_registry() {
        let db = memory_db("heroes");
        let humans = db.collection("humans").unwrap();
        let db_handle = db
            .insert_local("foobar", document_data(json!({ "n": 1 })).unwrap())
            .await
            .unwrap();
        let humans_handle = humans
            .insert_local("foobar", document_data(json!({ "n": 2 })).unwrap())
            .await
            .unwrap();

        let poisoner = db.clone();
        let _ = std::thread::spawn(move || {
            let _registry = poisoner.inner.collections.write().unwrap();
            panic!("collection registry poisoned on purpose");
        })
        .join();

        let err = db.destroy().await.unwrap_err();
        assert!(matches!(
            err,
            LocdocError::Storage(StorageError::LockPoisoned)
        ));

        assert!(db.is_destroyed());
        assert!(humans.is_destroyed());
        assert!(db_handle.is_removed());
        assert!(humans_handle.is_removed());
        assert!(db.destroy().await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_keeps_data_remove_wipes_it() {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let first = Database::with_backend("heroes", Arc::clone(&backend), 8).unwrap();
        first
            .insert_local("foobar", document_data(json!({ "n": 1 })).unwrap())
            .await
            .unwrap();
        first.destroy().await.unwrap();

        let second = Database::with_backend("heroes", Arc::clone(&backend), 8).unwrap();
        let found = second.get_local("foobar").await.unwrap().unwrap();
        assert_eq!(found.get("n").unwrap(), Some(json!(1)));

        assert_eq!(second.remove().await.unwrap(), 1);
        let third = Database::with_backend("heroes", backend, 8).unwrap();
        assert!(third.get_local("foobar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_local_id_is_validation_error() {
        let db = memory_db("heroes");
        let err = db.get_local("").await.unwrap_err();
        assert!(matches!(err, LocdocError::Validation(_)));
    }
}
