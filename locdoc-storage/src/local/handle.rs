//! Caller-facing local document handles.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use locdoc_core::{
    DocumentData, LocalDocumentError, LocalDocumentId, LocdocError, LocdocResult, StorageError,
};
use serde_json::Value;

use super::cache::{CacheInner, LocalDocumentCache};

const DROPPED: &str = "namespace was dropped";

/// Lifecycle of a handle.
#[derive(Debug)]
enum HandleState {
    Active(DocumentData),
    Removed { reason: &'static str },
}

/// Shared state behind every clone of one handle.
pub(crate) struct HandleInner {
    id: LocalDocumentId,
    state: RwLock<HandleState>,
    owner: Weak<CacheInner>,
}

/// A live local document.
///
/// Handles are cheap to clone and compare by identity: two handles are equal
/// only if they are the same cached instance. While a document is active its
/// namespace hands out that one instance for every lookup.
///
/// After [`remove`](Self::remove) the handle is dead. Reads, edits and a
/// second removal fail with `InvalidState`.
#[derive(Clone)]
pub struct LocalDocumentHandle {
    inner: Arc<HandleInner>,
}

impl LocalDocumentHandle {
    pub(crate) fn new(id: LocalDocumentId, data: DocumentData, owner: Weak<CacheInner>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                state: RwLock::new(HandleState::Active(data)),
                owner,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HandleInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<HandleInner> {
        &self.inner
    }

    pub fn id(&self) -> &LocalDocumentId {
        &self.inner.id
    }

    /// Read a top-level field of the current data.
    ///
    /// `Ok(None)` if the field is not set.
    pub fn get(&self, field: &str) -> LocdocResult<Option<Value>> {
        let state = self.read_state()?;
        match &*state {
            HandleState::Active(data) => Ok(data.get(field).cloned()),
            HandleState::Removed { reason } => Err(self.invalid_state(reason)),
        }
    }

    /// Snapshot of the current data.
    pub fn data(&self) -> LocdocResult<DocumentData> {
        let state = self.read_state()?;
        match &*state {
            HandleState::Active(data) => Ok(data.clone()),
            HandleState::Removed { reason } => Err(self.invalid_state(reason)),
        }
    }

    /// `{"id": .., "data": {..}}`
    pub fn to_json(&self) -> LocdocResult<Value> {
        Ok(serde_json::json!({
            "id": self.inner.id.as_str(),
            "data": Value::Object(self.data()?),
        }))
    }

    /// Set a top-level field in memory.
    ///
    /// Nothing is written until [`save`](Self::save) is awaited.
    pub fn set(&self, field: impl Into<String>, value: Value) -> LocdocResult<()> {
        let mut state = self.write_state()?;
        match &mut *state {
            HandleState::Active(data) => {
                data.insert(field.into(), value);
                Ok(())
            }
            HandleState::Removed { reason } => Err(self.invalid_state(reason)),
        }
    }

    /// Persist the current in-memory data.
    pub async fn save(&self) -> LocdocResult<()> {
        self.ensure_active()?;
        self.owner()?.save_handle(self).await
    }

    /// Delete this document from its namespace.
    ///
    /// On success the handle transitions to removed and a later lookup of the
    /// same id reports absence.
    pub async fn remove(&self) -> LocdocResult<()> {
        self.ensure_active()?;
        self.owner()?.remove_handle(self).await
    }

    /// True once the handle was removed or its namespace closed.
    pub fn is_removed(&self) -> bool {
        self.inner
            .state
            .read()
            .map(|state| matches!(*state, HandleState::Removed { .. }))
            .unwrap_or(true)
    }

    /// True if both handles are the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ensure_active(&self) -> LocdocResult<()> {
        let state = self.read_state()?;
        match &*state {
            HandleState::Active(_) => Ok(()),
            HandleState::Removed { reason } => Err(self.invalid_state(reason)),
        }
    }

    pub(crate) fn replace_data(&self, data: DocumentData) -> LocdocResult<()> {
        let mut state = self.write_state()?;
        match &mut *state {
            HandleState::Active(current) => {
                *current = data;
                Ok(())
            }
            HandleState::Removed { reason } => Err(self.invalid_state(reason)),
        }
    }

    pub(crate) fn mark_removed(&self, reason: &'static str) -> LocdocResult<()> {
        *self.write_state()? = HandleState::Removed { reason };
        Ok(())
    }

    fn owner(&self) -> LocdocResult<LocalDocumentCache> {
        self.inner
            .owner
            .upgrade()
            .map(LocalDocumentCache::from_inner)
            .ok_or_else(|| self.invalid_state(DROPPED))
    }

    fn invalid_state(&self, reason: &str) -> LocdocError {
        LocalDocumentError::InvalidState {
            id: self.inner.id.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn read_state(&self) -> LocdocResult<RwLockReadGuard<'_, HandleState>> {
        Ok(self
            .inner
            .state
            .read()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    fn write_state(&self) -> LocdocResult<RwLockWriteGuard<'_, HandleState>> {
        Ok(self
            .inner
            .state
            .write()
            .map_err(|_| StorageError::LockPoisoned)?)
    }
}

impl PartialEq for LocalDocumentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for LocalDocumentHandle {}

impl fmt::Debug for LocalDocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDocumentHandle")
            .field("id", &self.inner.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}
