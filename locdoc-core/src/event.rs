//! Change events.
//!
//! Local documents and regular documents publish on separate streams.
//! [`ChangeEvent`] is the main collection pipeline and never carries a local
//! document; [`LocalDocumentChange`] is the per-namespace local stream.

use serde::{Deserialize, Serialize};

use crate::{DocumentData, InstanceToken, LocalDocumentId, NamespaceKey, Timestamp};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Remove,
}

/// A mutation of a regular collection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
    pub data: Option<DocumentData>,
    /// Instance that performed the write.
    pub token: InstanceToken,
    pub occurred_at: Timestamp,
}

/// A mutation of a local document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDocumentChange {
    pub namespace: NamespaceKey,
    pub id: LocalDocumentId,
    pub kind: ChangeKind,
    /// Data after the change; `None` for removals.
    pub data: Option<DocumentData>,
    pub occurred_at: Timestamp,
}
