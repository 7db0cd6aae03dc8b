//! Durable storage backend trait.
//!
//! This module defines the key-value contract every durable storage
//! collaborator implements. Records are opaque bytes here; encoding them is
//! the caller's job.

use async_trait::async_trait;
use locdoc_core::{LocdocResult, NamespaceKey};

/// Durable key-value storage, scoped by namespace.
///
/// # Atomicity
///
/// Each call is atomic for the single key it touches. `put_if_absent` must
/// check and write in one step; the local document layer relies on it so that
/// only one of several racing creators wins.
///
/// # Isolation
///
/// Keys are built from the full [`NamespaceKey`], so a namespace can never
/// observe another namespace's records, including the same id stored at
/// database level and at collection level.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a record. `None` if absent.
    async fn get(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<Option<Vec<u8>>>;

    /// Write a record, replacing any previous value.
    async fn put(&self, namespace: &NamespaceKey, id: &str, value: &[u8]) -> LocdocResult<()>;

    /// Write a record only if the key is free.
    ///
    /// Returns `false` without writing if a record already exists.
    async fn put_if_absent(
        &self,
        namespace: &NamespaceKey,
        id: &str,
        value: &[u8],
    ) -> LocdocResult<bool>;

    /// Delete a record. Returns whether one existed.
    async fn delete(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<bool>;

    /// All records of a namespace, ordered by id bytes.
    async fn list(&self, namespace: &NamespaceKey) -> LocdocResult<Vec<(String, Vec<u8>)>>;

    /// Delete every record of a namespace. Returns the number deleted.
    async fn clear(&self, namespace: &NamespaceKey) -> LocdocResult<u64>;

    /// Delete every record of every namespace owned by `database`.
    async fn clear_database(&self, database: &str) -> LocdocResult<u64>;

    /// Usage counters.
    async fn stats(&self) -> LocdocResult<BackendStats>;
}

/// Statistics about backend usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Number of `get` calls.
    pub reads: u64,
    /// Number of successful writes (`put` and winning `put_if_absent`).
    pub writes: u64,
    /// Number of records actually deleted.
    pub deletes: u64,
    /// Number of records currently stored.
    pub entry_count: u64,
}
