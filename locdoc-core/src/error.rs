//! Error types for locdoc operations

use thiserror::Error;

/// Storage layer errors.
///
/// Every failure reported by a storage backend surfaces as one of these,
/// unmodified. Nothing in this workspace retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Failed to serialize record {id}: {reason}")]
    Serialization { id: String, reason: String },

    #[error("Failed to deserialize record {id}: {reason}")]
    Deserialization { id: String, reason: String },

    #[error("Document {id} already exists in {namespace}")]
    DocumentExists { namespace: String, id: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised by the local document subsystem itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalDocumentError {
    /// Callers match on the "already exists" phrase; keep it in the message.
    #[error("Local document {id} already exists in {namespace}")]
    AlreadyExists { namespace: String, id: String },

    #[error("Local document {id} is in an invalid state: {reason}")]
    InvalidState { id: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Local document id must not be empty")]
    EmptyId,

    #[error("Invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: String,
        name: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Database and collection lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Database {name} has been destroyed")]
    Destroyed { name: String },

    #[error("Collection {name} has been destroyed")]
    CollectionDestroyed { name: String },

    #[error("Collection {name} already exists")]
    CollectionExists { name: String },

    #[error("Namespace {namespace} is closed")]
    NamespaceClosed { namespace: String },
}

/// Master error type for all locdoc errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocdocError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Local document error: {0}")]
    LocalDocument(#[from] LocalDocumentError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl LocdocError {
    /// True for a failed local document insert on an id that is already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            LocdocError::LocalDocument(LocalDocumentError::AlreadyExists { .. })
        )
    }

    /// True when an operation targeted a removed handle.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            LocdocError::LocalDocument(LocalDocumentError::InvalidState { .. })
        )
    }

    /// True for failures reported by the durable storage collaborator.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, LocdocError::Storage(_))
    }
}

/// Result type alias for locdoc operations.
pub type LocdocResult<T> = Result<T, LocdocError>;

// =============================================================================
// TESTS
// =============================================================================
