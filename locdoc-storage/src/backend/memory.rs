//! In-memory storage backend.
//!
//! Suitable for tests and for databases that do not need to outlive the
//! process. Records are kept in one ordered map keyed by the encoded
//! [`ScopedKey`], which gives the same namespace isolation and ordering as the
//! LMDB backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use locdoc_core::{LocdocResult, NamespaceKey, StorageError};

use super::scoped_key::ScopedKey;
use super::traits::{BackendStats, StorageBackend};

/// In-memory backend.
///
/// Cloning shares the underlying map, so two clones behave like two handles
/// on the same storage (useful for multi-instance tests).
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    /// Create a new, empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with a storage error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.counters.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write or delete fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.counters.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored records across all namespaces.
    pub fn len(&self) -> LocdocResult<usize> {
        Ok(self.read_entries()?.len())
    }

    pub fn is_empty(&self) -> LocdocResult<bool> {
        Ok(self.read_entries()?.is_empty())
    }

    fn read_entries(
        &self,
    ) -> LocdocResult<std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    fn write_entries(
        &self,
    ) -> LocdocResult<std::sync::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        Ok(self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    fn check_read(&self, operation: &str) -> LocdocResult<()> {
        if self.counters.fail_reads.load(Ordering::SeqCst) {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> LocdocResult<()> {
        if self.counters.fail_writes.load(Ordering::SeqCst) {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn remove_prefix(&self, prefix: &[u8]) -> LocdocResult<u64> {
        let mut entries = self.write_entries()?;
        let keys: Vec<Vec<u8>> = entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            entries.remove(key);
        }

        let deleted = keys.len() as u64;
        self.counters.deletes.fetch_add(deleted, Ordering::Relaxed);
        Ok(deleted)
    }
}

fn injected(operation: &str) -> locdoc_core::LocdocError {
    StorageError::Backend {
        operation: operation.to_string(),
        reason: "injected failure".to_string(),
    }
    .into()
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<Option<Vec<u8>>> {
        self.check_read("get")?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let key = ScopedKey::new(namespace.clone(), id).encode();
        Ok(self.read_entries()?.get(&key).cloned())
    }

    async fn put(&self, namespace: &NamespaceKey, id: &str, value: &[u8]) -> LocdocResult<()> {
        self.check_write("put")?;
        let key = ScopedKey::new(namespace.clone(), id).encode();
        self.write_entries()?.insert(key, value.to_vec());
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        namespace: &NamespaceKey,
        id: &str,
        value: &[u8],
    ) -> LocdocResult<bool> {
        self.check_write("put_if_absent")?;
        let key = ScopedKey::new(namespace.clone(), id).encode();
        let mut entries = self.write_entries()?;
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, value.to_vec());
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn delete(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<bool> {
        self.check_write("delete")?;
        let key = ScopedKey::new(namespace.clone(), id).encode();
        let deleted = self.write_entries()?.remove(&key).is_some();
        if deleted {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(deleted)
    }

    async fn list(&self, namespace: &NamespaceKey) -> LocdocResult<Vec<(String, Vec<u8>)>> {
        self.check_read("list")?;
        let prefix = ScopedKey::namespace_prefix(namespace);
        let entries = self.read_entries()?;

        let mut records = Vec::new();
        for (key, value) in entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
        {
            if let Some(scoped) = ScopedKey::decode(key) {
                records.push((scoped.id().to_string(), value.clone()));
            }
        }
        Ok(records)
    }

    async fn clear(&self, namespace: &NamespaceKey) -> LocdocResult<u64> {
        self.check_write("clear")?;
        self.remove_prefix(&ScopedKey::namespace_prefix(namespace))
    }

    async fn clear_database(&self, database: &str) -> LocdocResult<u64> {
        self.check_write("clear_database")?;
        self.remove_prefix(&ScopedKey::database_prefix(database))
    }

    async fn stats(&self) -> LocdocResult<BackendStats> {
        Ok(BackendStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            entry_count: self.read_entries()?.len() as u64,
        })
    }
}
