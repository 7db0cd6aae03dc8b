//! Storage namespaces.
//!
//! Every record lives in exactly one namespace. A namespace is owned either by
//! a database instance or by one collection of that database, and within an
//! owner it separates local documents from regular documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which family of records a namespace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NamespaceKind {
    /// Local documents: never queried, never replicated, no change events
    /// on the main pipeline.
    Local,
    /// Regular collection documents.
    Documents,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Local => "local",
            NamespaceKind::Documents => "documents",
        }
    }
}

/// Identity of one storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamespaceKey {
    /// Records owned by the database itself.
    Database {
        database: String,
        kind: NamespaceKind,
    },
    /// Records owned by one collection.
    Collection {
        database: String,
        collection: String,
        kind: NamespaceKind,
    },
}

impl NamespaceKey {
    pub fn database(database: impl Into<String>, kind: NamespaceKind) -> Self {
        Self::Database {
            database: database.into(),
            kind,
        }
    }

    pub fn collection(
        database: impl Into<String>,
        collection: impl Into<String>,
        kind: NamespaceKind,
    ) -> Self {
        Self::Collection {
            database: database.into(),
            collection: collection.into(),
            kind,
        }
    }

    /// Name of the database this namespace belongs to.
    pub fn database_name(&self) -> &str {
        match self {
            Self::Database { database, .. } | Self::Collection { database, .. } => database,
        }
    }

    /// Name of the owning collection, if this is a collection namespace.
    pub fn collection_name(&self) -> Option<&str> {
        match self {
            Self::Database { .. } => None,
            Self::Collection { collection, .. } => Some(collection),
        }
    }

    pub fn kind(&self) -> NamespaceKind {
        match self {
            Self::Database { kind, .. } | Self::Collection { kind, .. } => *kind,
        }
    }

    /// Same owner, different record family.
    pub fn with_kind(&self, kind: NamespaceKind) -> Self {
        match self {
            Self::Database { database, .. } => Self::Database {
                database: database.clone(),
                kind,
            },
            Self::Collection {
                database,
                collection,
                ..
            } => Self::Collection {
                database: database.clone(),
                collection: collection.clone(),
                kind,
            },
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind() == NamespaceKind::Local
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { database, kind } => {
                write!(f, "database:{database}/{}", kind.as_str())
            }
            Self::Collection {
                database,
                collection,
                kind,
            } => write!(f, "collection:{database}/{collection}/{}", kind.as_str()),
        }
    }
}
