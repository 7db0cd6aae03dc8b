//! Identity-preserving cache for one local document namespace.
//!
//! Every active local document has exactly one live [`LocalDocumentHandle`]
//! per namespace. Lookups return that instance; the store is consulted only
//! on a miss. Operations on one namespace are serialized by the entries lock,
//! which is held across the store round-trip so that check-then-write races
//! between callers in this process cannot happen. Writers in other processes
//! are caught by the backend's atomic `put_if_absent`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use locdoc_core::{
    ChangeKind, DatabaseError, DocumentData, LocalDocumentChange, LocalDocumentError,
    LocalDocumentId, LocalDocumentRecord, LocdocResult, NamespaceKey,
};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, trace};

use super::handle::{HandleInner, LocalDocumentHandle};
use super::store::LocalDocumentStore;

const REMOVED: &str = "document was removed";
const CLOSED: &str = "namespace was closed";

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that went to the store.
    pub misses: u64,
    /// Live handles currently cached.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub(crate) struct CacheInner {
    store: LocalDocumentStore,
    entries: Mutex<HashMap<LocalDocumentId, Arc<HandleInner>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    changes: broadcast::Sender<LocalDocumentChange>,
    closed: AtomicBool,
}

/// Local documents of one namespace, fronted by an identity map.
///
/// Cloning is cheap and yields another reference to the same cache.
#[derive(Clone)]
pub struct LocalDocumentCache {
    inner: Arc<CacheInner>,
}

impl LocalDocumentCache {
    /// Create a cache over `store`.
    ///
    /// `change_buffer` bounds the local change stream; slow subscribers lag
    /// rather than block writers.
    pub fn new(store: LocalDocumentStore, change_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self {
            inner: Arc::new(CacheInner {
                store,
                entries: Mutex::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                changes,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<CacheInner>) -> Self {
        Self { inner }
    }

    pub fn namespace(&self) -> &NamespaceKey {
        self.inner.store.namespace()
    }

    pub fn store(&self) -> &LocalDocumentStore {
        &self.inner.store
    }

    /// Create a new local document.
    ///
    /// Fails with `AlreadyExists` if the id is active in this namespace,
    /// whether it is cached here or was written by another instance.
    pub async fn insert(
        &self,
        id: LocalDocumentId,
        data: DocumentData,
    ) -> LocdocResult<LocalDocumentHandle> {
        let mut entries = self.lock_open().await?;

        if entries.contains_key(&id) {
            return Err(self.already_exists(&id));
        }

        let record = LocalDocumentRecord::new(id, data);
        self.inner.store.create(&record).await?;

        let LocalDocumentRecord { id, data } = record;
        let handle = self.cache_handle(&mut entries, id.clone(), data.clone());
        debug!(namespace = %self.namespace(), id = %id, "Inserted local document");
        self.publish(id, ChangeKind::Insert, Some(data));
        Ok(handle)
    }

    /// Look up a local document.
    ///
    /// Returns the cached handle when there is one, without touching the
    /// store. `Ok(None)` if no active document has this id.
    pub async fn get(&self, id: &LocalDocumentId) -> LocdocResult<Option<LocalDocumentHandle>> {
        let mut entries = self.lock_open().await?;

        if let Some(inner) = entries.get(id) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            trace!(namespace = %self.namespace(), id = %id, "Local document cache hit");
            return Ok(Some(LocalDocumentHandle::from_inner(Arc::clone(inner))));
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        trace!(namespace = %self.namespace(), id = %id, "Local document cache miss");

        match self.inner.store.find(id).await? {
            Some(record) => Ok(Some(self.cache_handle(&mut entries, record.id, record.data))),
            None => Ok(None),
        }
    }

    /// Create or wholly replace a local document.
    ///
    /// If a handle is already live for `id` its data is replaced in place and
    /// that same handle is returned. On a miss the store is consulted: an
    /// existing record is overwritten and reported as an update, otherwise the
    /// document is created exactly like [`insert`](Self::insert). The new data
    /// is persisted before any handle changes, so a failed write leaves the
    /// cache as it was.
    pub async fn upsert(
        &self,
        id: LocalDocumentId,
        data: DocumentData,
    ) -> LocdocResult<LocalDocumentHandle> {
        let mut entries = self.lock_open().await?;

        if let Some(inner) = entries.get(&id) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            let handle = LocalDocumentHandle::from_inner(Arc::clone(inner));

            let record = LocalDocumentRecord::new(id, data);
            self.inner.store.save(&record).await?;
            let LocalDocumentRecord { id, data } = record;

            handle.replace_data(data.clone())?;
            debug!(namespace = %self.namespace(), id = %id, "Replaced local document");
            self.publish(id, ChangeKind::Update, Some(data));
            return Ok(handle);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        trace!(namespace = %self.namespace(), id = %id, "Local document cache miss");

        let exists = self.inner.store.find(&id).await?.is_some();
        let record = LocalDocumentRecord::new(id, data);
        let kind = if exists {
            self.inner.store.save(&record).await?;
            ChangeKind::Update
        } else {
            self.inner.store.create(&record).await?;
            ChangeKind::Insert
        };

        let LocalDocumentRecord { id, data } = record;
        let handle = self.cache_handle(&mut entries, id.clone(), data.clone());
        debug!(namespace = %self.namespace(), id = %id, ?kind, "Upserted local document");
        self.publish(id, kind, Some(data));
        Ok(handle)
    }

    pub(crate) async fn remove_handle(&self, handle: &LocalDocumentHandle) -> LocdocResult<()> {
        let mut entries = self.lock_open().await?;
        handle.ensure_active()?;

        let id = handle.id().clone();
        self.inner.store.remove(&id).await?;

        if entries
            .get(&id)
            .is_some_and(|cached| Arc::ptr_eq(cached, handle.inner()))
        {
            entries.remove(&id);
        }
        handle.mark_removed(REMOVED)?;

        debug!(namespace = %self.namespace(), id = %id, "Removed local document");
        self.publish(id, ChangeKind::Remove, None);
        Ok(())
    }

    pub(crate) async fn save_handle(&self, handle: &LocalDocumentHandle) -> LocdocResult<()> {
        let _entries = self.lock_open().await?;
        let data = handle.data()?;

        let record = LocalDocumentRecord::new(handle.id().clone(), data);
        self.inner.store.save(&record).await?;

        let LocalDocumentRecord { id, data } = record;
        debug!(namespace = %self.namespace(), id = %id, "Saved local document");
        self.publish(id, ChangeKind::Update, Some(data));
        Ok(())
    }

    /// Subscribe to this namespace's local change stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LocalDocumentChange> {
        self.inner.changes.subscribe()
    }

    /// Number of live handles.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            entry_count: self.len().await as u64,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the namespace.
    ///
    /// Every cached handle becomes removed and later operations fail with
    /// `NamespaceClosed`. Durable data is left alone. Returns the number of
    /// handles that were live. A handle that cannot be marked does not stop
    /// the others; the first such error is returned.
    pub async fn close(&self) -> LocdocResult<usize> {
        let mut entries = self.inner.entries.lock().await;
        self.inner.closed.store(true, Ordering::SeqCst);

        let count = entries.len();
        let mut result = Ok(());
        for (_, inner) in entries.drain() {
            let marked = LocalDocumentHandle::from_inner(inner).mark_removed(CLOSED);
            result = result.and(marked);
        }
        debug!(namespace = %self.namespace(), handles = count, "Closed local namespace");
        result.map(|()| count)
    }

    /// Close the namespace and delete its durable records.
    pub async fn purge(&self) -> LocdocResult<u64> {
        self.close().await?;
        let deleted = self.inner.store.clear().await?;
        debug!(namespace = %self.namespace(), deleted, "Purged local namespace");
        Ok(deleted)
    }

    async fn lock_open(
        &self,
    ) -> LocdocResult<MutexGuard<'_, HashMap<LocalDocumentId, Arc<HandleInner>>>> {
        let entries = self.inner.entries.lock().await;
        if self.is_closed() {
            return Err(DatabaseError::NamespaceClosed {
                namespace: self.namespace().to_string(),
            }
            .into());
        }
        Ok(entries)
    }

    fn cache_handle(
        &self,
        entries: &mut HashMap<LocalDocumentId, Arc<HandleInner>>,
        id: LocalDocumentId,
        data: DocumentData,
    ) -> LocalDocumentHandle {
        let handle = LocalDocumentHandle::new(id.clone(), data, Arc::downgrade(&self.inner));
        entries.insert(id, Arc::clone(handle.inner()));
        handle
    }

    fn publish(&self, id: LocalDocumentId, kind: ChangeKind, data: Option<DocumentData>) {
        let change = LocalDocumentChange {
            namespace: self.namespace().clone(),
            id,
            kind,
            data,
            occurred_at: Utc::now(),
        };
        if self.inner.changes.send(change).is_err() {
            trace!(namespace = %self.namespace(), "No local change subscribers");
        }
    }

    fn already_exists(&self, id: &LocalDocumentId) -> locdoc_core::LocdocError {
        LocalDocumentError::AlreadyExists {
            namespace: self.namespace().to_string(),
            id: id.to_string(),
        }
        .into()
    }
}

impl std::fmt::Debug for LocalDocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocumentCache")
            .field("namespace", self.namespace())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, StorageBackend};
    use locdoc_core::{document_data, LocdocError, NamespaceKind};
    use serde_json::{json, Value};

    fn data(value: Value) -> DocumentData {
        document_data(value).unwrap()
    }

    fn id(value: &str) -> LocalDocumentId {
        LocalDocumentId::new(value).unwrap()
    }

    fn cache_on(backend: Arc<InMemoryBackend>, owner: &NamespaceKey) -> LocalDocumentCache {
        LocalDocumentCache::new(LocalDocumentStore::new(backend, owner), 16)
    }

    fn database_cache() -> (Arc<InMemoryBackend>, LocalDocumentCache) {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = cache_on(
            backend.clone(),
            &NamespaceKey::database("heroes", NamespaceKind::Local),
        );
        (backend, cache)
    }

    #[tokio::test]
    async fn test_insert_then_get_returns_same_handle() {
        let (_, cache) = database_cache();
        let inserted = cache
            .insert(id("foobar"), data(json!({ "foo": "bar" })))
            .await
            .unwrap();
        let found = cache.get(&id("foobar")).await.unwrap().unwrap();

        assert_eq!(inserted, found);
        assert_eq!(found.get("foo").unwrap(), Some(json!("bar")));
    }

    #[tokio::test]
    async fn test_insert_twice_fails_and_keeps_first() {
        let (_, cache) = database_cache();
        cache
            .insert(id("foobar"), data(json!({ "foo": "bar" })))
            .await
            .unwrap();

        let err = cache
            .insert(id("foobar"), data(json!({ "foo": "baz" })))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("already exists"));

        let found = cache.get(&id("foobar")).await.unwrap().unwrap();
        assert_eq!(found.get("foo").unwrap(), Some(json!("bar")));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_, cache) = database_cache();
        assert!(cache.get(&id("foobar")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_touch_store() {
        let (backend, cache) = database_cache();
        cache.insert(id("foobar"), data(json!({}))).await.unwrap();

        backend.set_fail_reads(true);
        assert!(cache.get(&id("foobar")).await.unwrap().is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_miss_loads_from_store_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let owner = NamespaceKey::database("heroes", NamespaceKind::Local);
        cache_on(backend.clone(), &owner)
            .insert(id("foobar"), data(json!({ "n": 1 })))
            .await
            .unwrap();

        let fresh = cache_on(backend, &owner);
        let first = fresh.get(&id("foobar")).await.unwrap().unwrap();
        let second = fresh.get(&id("foobar")).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get("n").unwrap(), Some(json!(1)));
        let stats = fresh.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_replaces_in_place() {
        let (_, cache) = database_cache();
        let created = cache
            .upsert(id("foobar"), data(json!({ "foo": "bar", "extra": true })))
            .await
            .unwrap();
        let replaced = cache
            .upsert(id("foobar"), data(json!({ "foo": "bar2" })))
            .await
            .unwrap();

        assert_eq!(created, replaced);
        assert_eq!(created.get("foo").unwrap(), Some(json!("bar2")));
        assert_eq!(created.get("extra").unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_failure_leaves_handle_unchanged() {
        let (backend, cache) = database_cache();
        let handle = cache
            .upsert(id("foobar"), data(json!({ "foo": "bar" })))
            .await
            .unwrap();

        backend.set_fail_writes(true);
        let err = cache
            .upsert(id("foobar"), data(json!({ "foo": "bar2" })))
            .await
            .unwrap_err();

        assert!(err.is_storage_failure());
        assert_eq!(handle.get("foo").unwrap(), Some(json!("bar")));
    }

    #[tokio::test]
    async fn test_upsert_of_stored_record_is_an_update() {
        let backend = Arc::new(InMemoryBackend::new());
        let owner = NamespaceKey::database("heroes", NamespaceKind::Local);
        let a = cache_on(backend.clone(), &owner);
        let b = cache_on(backend, &owner);
        let mut changes = b.subscribe();

        a.insert(id("foobar"), data(json!({ "v": 1 })))
            .await
            .unwrap();
        let upserted = b
            .upsert(id("foobar"), data(json!({ "v": 2 })))
            .await
            .unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.data, Some(data(json!({ "v": 2 }))));
        assert_eq!(upserted.get("v").unwrap(), Some(json!(2)));

        let found = b.get(&id("foobar")).await.unwrap().unwrap();
        assert_eq!(found, upserted);

        let stats = b.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_upsert_of_absent_record_is_an_insert() {
        let (_, cache) = database_cache();
        let mut changes = cache.subscribe();

        cache
            .upsert(id("foobar"), data(json!({ "v": 1 })))
            .await
            .unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_upsert_miss_failure_caches_nothing() {
        let (backend, cache) = database_cache();
        backend.set_fail_writes(true);

        let err = cache
            .upsert(id("foobar"), data(json!({ "v": 1 })))
            .await
            .unwrap_err();
        assert!(err.is_storage_failure());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_then_get_is_none() {
        let (_, cache) = database_cache();
        let handle = cache
            .insert(id("foobar"), data(json!({ "foo": "bar" })))
            .await
            .unwrap();

        handle.remove().await.unwrap();

        assert!(handle.is_removed());
        assert!(cache.get(&id("foobar")).await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_double_remove_is_invalid_state() {
        let (_, cache) = database_cache();
        let handle = cache.insert(id("foobar"), data(json!({}))).await.unwrap();
        handle.remove().await.unwrap();

        let err = handle.remove().await.unwrap_err();
        assert!(err.is_invalid_state());
        assert!(handle.get("foo").unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn test_insert_after_remove_gives_new_handle() {
        let (_, cache) = database_cache();
        let first = cache
            .insert(id("foobar"), data(json!({ "n": 1 })))
            .await
            .unwrap();
        first.remove().await.unwrap();

        let second = cache
            .insert(id("foobar"), data(json!({ "n": 2 })))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(second.get("n").unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_handle_active() {
        let (backend, cache) = database_cache();
        let handle = cache.insert(id("foobar"), data(json!({}))).await.unwrap();

        backend.set_fail_writes(true);
        assert!(handle.remove().await.unwrap_err().is_storage_failure());
        assert!(!handle.is_removed());

        backend.set_fail_writes(false);
        let found = cache.get(&id("foobar")).await.unwrap().unwrap();
        assert_eq!(found, handle);
    }

    #[tokio::test]
    async fn test_set_and_save_persist() {
        let backend = Arc::new(InMemoryBackend::new());
        let owner = NamespaceKey::database("heroes", NamespaceKind::Local);
        let cache = cache_on(backend.clone(), &owner);
        let handle = cache
            .insert(id("cursor"), data(json!({ "seq": 1 })))
            .await
            .unwrap();

        handle.set("seq", json!(2)).unwrap();
        handle.save().await.unwrap();

        let fresh = cache_on(backend, &owner);
        let reloaded = fresh.get(&id("cursor")).await.unwrap().unwrap();
        assert_eq!(reloaded.get("seq").unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_insert_detects_write_from_other_instance() {
        let backend = Arc::new(InMemoryBackend::new());
        let owner = NamespaceKey::database("heroes", NamespaceKind::Local);
        let a = cache_on(backend.clone(), &owner);
        let b = cache_on(backend, &owner);

        a.insert(id("foobar"), data(json!({}))).await.unwrap();
        let err = b.insert(id("foobar"), data(json!({}))).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_one_wins() {
        let (_, cache) = database_cache();

        let mut tasks = Vec::new();
        for n in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache.insert(id("foobar"), data(json!({ "n": n }))).await
            }));
        }

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(err.is_already_exists()),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_on_get_miss() {
        let (backend, cache) = database_cache();
        backend.set_fail_reads(true);
        let err = cache.get(&id("foobar")).await.unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let backend = Arc::new(InMemoryBackend::new());
        let db = cache_on(
            backend.clone(),
            &NamespaceKey::database("heroes", NamespaceKind::Local),
        );
        let humans = cache_on(
            backend.clone(),
            &NamespaceKey::collection("heroes", "humans", NamespaceKind::Documents),
        );

        db.insert(id("foobar"), data(json!({ "scope": "db" })))
            .await
            .unwrap();
        humans
            .insert(id("foobar"), data(json!({ "scope": "humans" })))
            .await
            .unwrap();

        let from_db = db.get(&id("foobar")).await.unwrap().unwrap();
        let from_humans = humans.get(&id("foobar")).await.unwrap().unwrap();
        assert_ne!(from_db, from_humans);
        assert_eq!(from_db.get("scope").unwrap(), Some(json!("db")));
        assert_eq!(from_humans.get("scope").unwrap(), Some(json!("humans")));

        let documents = NamespaceKey::collection("heroes", "humans", NamespaceKind::Documents);
        assert!(backend.list(&documents).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_stream() {
        let (_, cache) = database_cache();
        let mut changes = cache.subscribe();

        let handle = cache
            .insert(id("foobar"), data(json!({ "v": 1 })))
            .await
            .unwrap();
        cache
            .upsert(id("foobar"), data(json!({ "v": 2 })))
            .await
            .unwrap();
        handle.remove().await.unwrap();

        let insert = changes.recv().await.unwrap();
        assert_eq!(insert.kind, ChangeKind::Insert);
        assert_eq!(insert.id, id("foobar"));
        assert!(insert.namespace.is_local());

        let update = changes.recv().await.unwrap();
        assert_eq!(update.kind, ChangeKind::Update);
        assert_eq!(update.data, Some(data(json!({ "v": 2 }))));

        let remove = changes.recv().await.unwrap();
        assert_eq!(remove.kind, ChangeKind::Remove);
        assert_eq!(remove.data, None);
    }

    #[tokio::test]
    async fn test_close_invalidates_handles() {
        let (backend, cache) = database_cache();
        let handle = cache.insert(id("foobar"), data(json!({}))).await.unwrap();

        assert_eq!(cache.close().await.unwrap(), 1);
        assert!(handle.is_removed());
        assert!(handle.remove().await.unwrap_err().is_invalid_state());

        let err = cache.get(&id("foobar")).await.unwrap_err();
        assert!(matches!(
            err,
            LocdocError::Database(DatabaseError::NamespaceClosed { .. })
        ));
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_deletes_records() {
        let (backend, cache) = database_cache();
        cache.insert(id("a"), data(json!({}))).await.unwrap();
        cache.insert(id("b"), data(json!({}))).await.unwrap();

        assert_eq!(cache.purge().await.unwrap(), 2);
        assert!(backend.is_empty().unwrap());
    }
}
