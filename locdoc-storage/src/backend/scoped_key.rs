//! Namespace-scoped storage keys.
//!
//! A `ScopedKey` can only be built from a full [`NamespaceKey`] plus a record
//! id, so no backend call can address a record without naming the namespace
//! it belongs to.

use locdoc_core::{NamespaceKey, NamespaceKind};

/// Separator byte between the namespace prefix and the record id.
///
/// Never valid inside UTF-8, so it cannot collide with name or id bytes.
const SEPARATOR: u8 = 0xFF;

const SCOPE_DATABASE: u8 = 0;
const SCOPE_COLLECTION: u8 = 1;

const KIND_LOCAL: u8 = 0;
const KIND_DOCUMENTS: u8 = 1;

/// A storage key scoped to one namespace.
///
/// # Binary Format
///
/// - 4 bytes: database name length (big endian)
/// - database name bytes
/// - 1 byte: scope (0 = database, 1 = collection)
/// - collection scope only: 4 bytes collection name length, collection name bytes
/// - 1 byte: kind (0 = local, 1 = documents)
/// - 1 byte: separator (0xFF)
/// - record id bytes
///
/// Every length is explicit, so the namespace prefix is self-delimiting:
/// - keys of one database share the database prefix and nothing else does
/// - database-level and collection-level namespaces never overlap
/// - local documents and regular documents of one owner never overlap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
    inner: ScopedKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopedKeyInner {
    namespace: NamespaceKey,
    id: String,
}

impl ScopedKey {
    pub fn new(namespace: NamespaceKey, id: impl Into<String>) -> Self {
        Self {
            inner: ScopedKeyInner {
                namespace,
                id: id.into(),
            },
        }
    }

    pub fn namespace(&self) -> &NamespaceKey {
        &self.inner.namespace
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Encode this key for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Self::namespace_prefix(&self.inner.namespace);
        bytes.extend_from_slice(self.inner.id.as_bytes());
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if any length is out of range, a tag byte is unknown,
    /// the separator is missing or a name is not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (database, rest) = read_name(bytes)?;
        let (scope, rest) = rest.split_first()?;

        let (collection, rest) = match *scope {
            SCOPE_DATABASE => (None, rest),
            SCOPE_COLLECTION => {
                let (collection, rest) = read_name(rest)?;
                (Some(collection), rest)
            }
            _ => return None,
        };

        let (kind, rest) = rest.split_first()?;
        let kind = byte_to_kind(*kind)?;

        let (separator, id) = rest.split_first()?;
        if *separator != SEPARATOR {
            return None;
        }
        let id = std::str::from_utf8(id).ok()?.to_string();

        let namespace = match collection {
            None => NamespaceKey::database(database, kind),
            Some(collection) => NamespaceKey::collection(database, collection, kind),
        };

        Some(Self::new(namespace, id))
    }

    /// Prefix shared by every key of one namespace.
    pub fn namespace_prefix(namespace: &NamespaceKey) -> Vec<u8> {
        let mut prefix = Self::database_prefix(namespace.database_name());
        match namespace.collection_name() {
            None => prefix.push(SCOPE_DATABASE),
            Some(collection) => {
                prefix.push(SCOPE_COLLECTION);
                write_name(&mut prefix, collection);
            }
        }
        prefix.push(kind_to_byte(namespace.kind()));
        prefix.push(SEPARATOR);
        prefix
    }

    /// Prefix shared by every key of one database, across all its namespaces.
    pub fn database_prefix(database: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(4 + database.len() + 8);
        write_name(&mut prefix, database);
        prefix
    }
}

fn write_name(buf: &mut Vec<u8>, name: &str) {
    // Names are validated to at most a few hundred bytes.
    let len = u32::try_from(name.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
}

fn read_name(bytes: &[u8]) -> Option<(String, &[u8])> {
    if bytes.len() < 4 {
        return None;
    }
    let (len_bytes, rest) = bytes.split_at(4);
    let len = u32::from_be_bytes(len_bytes.try_into().ok()?) as usize;
    if rest.len() < len {
        return None;
    }
    let (name, rest) = rest.split_at(len);
    Some((std::str::from_utf8(name).ok()?.to_string(), rest))
}

fn kind_to_byte(kind: NamespaceKind) -> u8 {
    match kind {
        NamespaceKind::Local => KIND_LOCAL,
        NamespaceKind::Documents => KIND_DOCUMENTS,
    }
}

fn byte_to_kind(byte: u8) -> Option<NamespaceKind> {
    match byte {
        KIND_LOCAL => Some(NamespaceKind::Local),
        KIND_DOCUMENTS => Some(NamespaceKind::Documents),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_local() -> NamespaceKey {
        NamespaceKey::database("heroes", NamespaceKind::Local)
    }

    fn humans_local() -> NamespaceKey {
        NamespaceKey::collection("heroes", "humans", NamespaceKind::Local)
    }

    #[test]
    fn test_new_and_getters() {
        let key = ScopedKey::new(humans_local(), "foobar");
        assert_eq!(key.namespace(), &humans_local());
        assert_eq!(key.id(), "foobar");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for namespace in [db_local(), humans_local()] {
            let key = ScopedKey::new(namespace, "foobar");
            let decoded = ScopedKey::decode(&key.encode()).expect("decode should succeed");
            assert_eq!(key, decoded);
        }
    }

    #[test]
    fn test_same_id_in_database_and_collection_scope_differs() {
        let db_key = ScopedKey::new(db_local(), "foobar");
        let col_key = ScopedKey::new(humans_local(), "foobar");
        assert_ne!(db_key.encode(), col_key.encode());
    }

    #[test]
    fn test_local_and_documents_kind_differ() {
        let local = ScopedKey::new(humans_local(), "foobar");
        let docs = ScopedKey::new(humans_local().with_kind(NamespaceKind::Documents), "foobar");
        assert_ne!(local.encode(), docs.encode());
    }

    #[test]
    fn test_namespace_prefix_is_prefix_of_key() {
        let key = ScopedKey::new(humans_local(), "foobar");
        let prefix = ScopedKey::namespace_prefix(&humans_local());
        assert!(key.encode().starts_with(&prefix));
        assert_eq!(*prefix.last().unwrap(), SEPARATOR);
    }

    #[test]
    fn test_database_prefix_covers_all_scopes() {
        let prefix = ScopedKey::database_prefix("heroes");
        for namespace in [db_local(), humans_local()] {
            assert!(ScopedKey::new(namespace, "x").encode().starts_with(&prefix));
        }
        let other = ScopedKey::new(NamespaceKey::database("heroes2", NamespaceKind::Local), "x");
        assert!(!other.encode().starts_with(&prefix));
    }

    #[test]
    fn test_collection_prefix_does_not_cover_longer_name() {
        let prefix = ScopedKey::namespace_prefix(&humans_local());
        let other = ScopedKey::new(
            NamespaceKey::collection("heroes", "humansx", NamespaceKind::Local),
            "foobar",
        );
        assert!(!other.encode().starts_with(&prefix));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ScopedKey::decode(&[]).is_none());
        assert!(ScopedKey::decode(&[0, 0, 0]).is_none());
        // Length claims more bytes than present
        assert!(ScopedKey::decode(&[0, 0, 0, 9, b'a']).is_none());

        let mut bytes = ScopedKey::new(db_local(), "foobar").encode();
        let separator_pos = bytes.iter().position(|b| *b == SEPARATOR).unwrap();
        bytes[separator_pos] = 0x00;
        assert!(ScopedKey::decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_scope_and_kind() {
        let mut bytes = ScopedKey::new(db_local(), "foobar").encode();
        // 4 length bytes + "heroes"
        bytes[10] = 7;
        assert!(ScopedKey::decode(&bytes).is_none());

        let mut bytes = ScopedKey::new(db_local(), "foobar").encode();
        bytes[11] = 9;
        assert!(ScopedKey::decode(&bytes).is_none());
    }
}
