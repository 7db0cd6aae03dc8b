//! Local documents.
//!
//! Local documents are keyed key/value records scoped to a database or to a
//! collection. They are not queryable and never appear in a collection's
//! main change stream.
//!
//! # Layers
//!
//! - [`LocalDocumentStore`] persists records of one namespace through a
//!   [`StorageBackend`](crate::backend::StorageBackend).
//! - [`LocalDocumentCache`] keeps one live [`LocalDocumentHandle`] per active
//!   id and serializes operations on the namespace.
//!
//! # Example
//!
//! ```ignore
//! let handle = cache.insert(LocalDocumentId::new("cursor")?, data).await?;
//! let same = cache.get(handle.id()).await?.expect("just inserted");
//! assert_eq!(handle, same);
//! handle.remove().await?;
//! ```

pub mod cache;
pub mod handle;
pub mod store;

pub use cache::{CacheStats, LocalDocumentCache};
pub use handle::LocalDocumentHandle;
pub use store::LocalDocumentStore;
