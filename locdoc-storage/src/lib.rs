//! locdoc Storage - Backends and Local Document Persistence
//!
//! Storage backends keyed by namespace, plus the local document store, the
//! identity cache and the handles built on top of them.

pub mod backend;
pub mod local;

pub use backend::{
    open_backend, BackendStats, InMemoryBackend, LmdbBackend, LmdbBackendError, ScopedKey,
    StorageBackend,
};
pub use local::{CacheStats, LocalDocumentCache, LocalDocumentHandle, LocalDocumentStore};
