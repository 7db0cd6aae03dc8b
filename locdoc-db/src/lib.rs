//! locdoc DB - Databases, Collections and Local Documents
//!
//! Local documents are non-replicated key/value records attached to a
//! [`Database`] or to a [`Collection`]. Both expose the same surface through
//! [`LocalDocuments`]:
//!
//! ```ignore
//! use locdoc_db::{Database, LocalDocuments};
//!
//! let db = Database::open(DatabaseConfig::in_memory("heroes"))?;
//! let humans = db.collection("humans")?;
//!
//! let cursor = humans.insert_local("cursor", data).await?;
//! let same = humans.get_local("cursor").await?.expect("inserted above");
//! assert_eq!(cursor, same);
//! ```

pub mod collection;
pub mod database;
pub mod local;

pub use collection::Collection;
pub use database::Database;
pub use local::LocalDocuments;

pub use locdoc_core::{
    document_data, BackendConfig, ChangeEvent, ChangeKind, DatabaseConfig, DocumentData,
    DocumentRecord, LocalDocumentChange, LocalDocumentId, LocdocError, LocdocResult,
};
pub use locdoc_storage::{LocalDocumentHandle, StorageBackend};
