//! locdoc Core - Entity Types
//!
//! Pure data structures shared by every locdoc crate: document identities and
//! records, namespace keys, change events, errors and configuration.
//! No storage or caching logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod event;
pub mod namespace;

pub use config::{validate_name, BackendConfig, DatabaseConfig, DEFAULT_CHANGE_BUFFER};
pub use error::{
    ConfigError, DatabaseError, LocalDocumentError, LocdocError, LocdocResult, StorageError,
    ValidationError,
};
pub use event::{ChangeEvent, ChangeKind, LocalDocumentChange};
pub use namespace::{NamespaceKey, NamespaceKind};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Token identifying one open database instance.
///
/// Two instances opened on the same storage get different tokens, which lets
/// change observers tell their own writes apart from another instance's.
pub type InstanceToken = Uuid;

/// Generate a new UUIDv7 instance token (timestamp-sortable).
pub fn new_instance_token() -> InstanceToken {
    Uuid::now_v7()
}

/// Document payload: an opaque string-keyed JSON mapping.
pub type DocumentData = serde_json::Map<String, serde_json::Value>;

/// Identifier of a local document, unique within one namespace.
///
/// The only structural rule is that it must not be empty; everything else
/// about the id is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalDocumentId(String);

impl LocalDocumentId {
    /// Create a local document id, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> LocdocResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LocalDocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocalDocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for LocalDocumentId {
    type Error = LocdocError;

    fn try_from(value: &str) -> LocdocResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for LocalDocumentId {
    type Error = LocdocError;

    fn try_from(value: String) -> LocdocResult<Self> {
        Self::new(value)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Persisted representation of a local document.
///
/// `data` is stored and returned verbatim; it is never merged or validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDocumentRecord {
    pub id: LocalDocumentId,
    pub data: DocumentData,
}

impl LocalDocumentRecord {
    pub fn new(id: LocalDocumentId, data: DocumentData) -> Self {
        Self { id, data }
    }
}

/// A regular (queryable) collection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub data: DocumentData,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, data: DocumentData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Read a top-level field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }
}

/// Convert a JSON value into [`DocumentData`].
///
/// Returns `None` unless the value is an object. Handy for building payloads
/// with `serde_json::json!`.
pub fn document_data(value: serde_json::Value) -> Option<DocumentData> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}
