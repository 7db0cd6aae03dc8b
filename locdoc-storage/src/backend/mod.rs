//! Durable storage collaborators.
//!
//! Everything above this module sees storage only through
//! [`StorageBackend`]. Two implementations ship with the crate: an in-memory
//! map for tests and ephemeral databases, and LMDB for data that must survive
//! restarts.

pub mod lmdb;
pub mod memory;
pub mod scoped_key;
pub mod traits;

use std::sync::Arc;

use locdoc_core::{BackendConfig, LocdocResult};

pub use lmdb::{LmdbBackend, LmdbBackendError};
pub use memory::InMemoryBackend;
pub use scoped_key::ScopedKey;
pub use traits::{BackendStats, StorageBackend};

/// Build the backend described by a configuration.
pub fn open_backend(config: &BackendConfig) -> LocdocResult<Arc<dyn StorageBackend>> {
    match config {
        BackendConfig::Memory => Ok(Arc::new(InMemoryBackend::new())),
        BackendConfig::Lmdb { path, max_size_mb } => {
            Ok(Arc::new(LmdbBackend::open(path, *max_size_mb)?))
        }
    }
}
