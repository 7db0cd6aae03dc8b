//! LMDB-backed durable storage.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the durable key-value
//! store behind local documents and collection documents.
//!
//! # Namespace Isolation
//!
//! All operations go through [`ScopedKey`], so:
//! - database-level and collection-level records never share keys
//! - clearing a namespace only touches that namespace
//! - a database's records can be wiped without touching other databases
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and `list`
//! - One write transaction per mutating call; `put_if_absent` checks and
//!   writes inside the same transaction
//! - Statistics are tracked behind an `RwLock`

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use locdoc_core::{LocdocResult, NamespaceKey};
use tracing::debug;

use super::scoped_key::ScopedKey;
use super::traits::{BackendStats, StorageBackend};

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbBackendError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbBackendError {
    fn operation(&self) -> &'static str {
        match self {
            LmdbBackendError::EnvOpen(_) => "open_env",
            LmdbBackendError::DbOpen(_) => "open_db",
            LmdbBackendError::Transaction(_) => "transaction",
            LmdbBackendError::Io(_) => "io",
        }
    }
}

/// Convert LmdbBackendError to LocdocError.
impl From<LmdbBackendError> for locdoc_core::LocdocError {
    fn from(e: LmdbBackendError) -> Self {
        locdoc_core::LocdocError::Storage(locdoc_core::StorageError::Backend {
            operation: e.operation().to_string(),
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbBackendError {
    LmdbBackendError::Transaction(e.to_string())
}

/// LMDB-backed durable storage.
///
/// # Example
///
/// ```ignore
/// use locdoc_storage::LmdbBackend;
///
/// let backend = LmdbBackend::open("/var/lib/locdoc", 64)?;
/// backend.put(&namespace, "cursor", br#"{"id":"cursor","data":{}}"#).await?;
/// ```
pub struct LmdbBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Usage statistics.
    stats: Arc<RwLock<BackendStats>>,
}

impl LmdbBackend {
    /// Open (or create) an LMDB backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbBackendError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per backend and the files are
        // not modified by anything but LMDB while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        let entry_count = {
            let rtxn = env.read_txn().map_err(txn_err)?;
            db.len(&rtxn).map_err(txn_err)?
        };
        debug!(path = %path.as_ref().display(), entry_count, "Opened LMDB backend");

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(BackendStats {
                entry_count,
                ..Default::default()
            })),
        })
    }

    fn record(&self, update: impl FnOnce(&mut BackendStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Collect the keys starting with `prefix`, with their values.
    ///
    /// Only the matching key range is visited.
    fn collect_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LmdbBackendError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let mut entries = Vec::new();
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(txn_err)?;
        for result in iter {
            let (key, value) = result.map_err(txn_err)?;
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }

    fn delete_with_prefix(&self, prefix: &[u8]) -> Result<u64, LmdbBackendError> {
        let keys: Vec<Vec<u8>> = self
            .collect_with_prefix(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key.as_slice()).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        self.record(|stats| {
            stats.deletes += deleted;
            stats.entry_count = stats.entry_count.saturating_sub(deleted);
        });
        Ok(deleted)
    }
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    async fn get(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<Option<Vec<u8>>> {
        let key = ScopedKey::new(namespace.clone(), id).encode();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let value = self
            .db
            .get(&rtxn, key.as_slice())
            .map_err(txn_err)?
            .map(|bytes| bytes.to_vec());
        self.record(|stats| stats.reads += 1);
        Ok(value)
    }

    async fn put(&self, namespace: &NamespaceKey, id: &str, value: &[u8]) -> LocdocResult<()> {
        let key = ScopedKey::new(namespace.clone(), id).encode();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let is_new = self
            .db
            .get(&wtxn, key.as_slice())
            .map_err(txn_err)?
            .is_none();
        self.db
            .put(&mut wtxn, key.as_slice(), value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        self.record(|stats| {
            stats.writes += 1;
            if is_new {
                stats.entry_count += 1;
            }
        });
        Ok(())
    }

    async fn put_if_absent(
        &self,
        namespace: &NamespaceKey,
        id: &str,
        value: &[u8],
    ) -> LocdocResult<bool> {
        let key = ScopedKey::new(namespace.clone(), id).encode();

        // LMDB allows a single writer, so the check and the write below
        // cannot interleave with another put.
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        if self
            .db
            .get(&wtxn, key.as_slice())
            .map_err(txn_err)?
            .is_some()
        {
            wtxn.abort();
            return Ok(false);
        }
        self.db
            .put(&mut wtxn, key.as_slice(), value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        self.record(|stats| {
            stats.writes += 1;
            stats.entry_count += 1;
        });
        Ok(true)
    }

    async fn delete(&self, namespace: &NamespaceKey, id: &str) -> LocdocResult<bool> {
        let key = ScopedKey::new(namespace.clone(), id).encode();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, key.as_slice()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        if deleted {
            self.record(|stats| {
                stats.deletes += 1;
                stats.entry_count = stats.entry_count.saturating_sub(1);
            });
        }
        Ok(deleted)
    }

    async fn list(&self, namespace: &NamespaceKey) -> LocdocResult<Vec<(String, Vec<u8>)>> {
        let prefix = ScopedKey::namespace_prefix(namespace);
        let records = self
            .collect_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|(key, value)| {
                ScopedKey::decode(&key).map(|scoped| (scoped.id().to_string(), value))
            })
            .collect();
        Ok(records)
    }

    async fn clear(&self, namespace: &NamespaceKey) -> LocdocResult<u64> {
        let deleted = self.delete_with_prefix(&ScopedKey::namespace_prefix(namespace))?;
        debug!(%namespace, deleted, "Cleared namespace");
        Ok(deleted)
    }

    async fn clear_database(&self, database: &str) -> LocdocResult<u64> {
        let deleted = self.delete_with_prefix(&ScopedKey::database_prefix(database))?;
        debug!(database, deleted, "Cleared database");
        Ok(deleted)
    }

    async fn stats(&self) -> LocdocResult<BackendStats> {
        Ok(self.stats.read().map(|s| s.clone()).unwrap_or_default())
    }
}
