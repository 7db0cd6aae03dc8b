//! locdoc Test Utilities
//!
//! Shared test infrastructure for the locdoc workspace:
//! - Fixtures for databases and pre-filled collections
//! - Proptest generators for local document ids and payloads
//! - Custom assertions for locdoc error kinds
//! - Tracing setup for tests

pub use locdoc_core::{
    document_data, DatabaseConfig, DocumentData, LocalDocumentId, LocdocError, LocdocResult,
};
pub use locdoc_db::{Collection, Database, LocalDocuments};
pub use locdoc_storage::{InMemoryBackend, LocalDocumentHandle};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a test subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `debug` for the locdoc crates.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("locdoc_core=debug,locdoc_storage=debug,locdoc_db=debug,info")
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built databases and collections.

    use super::*;
    use serde_json::json;

    /// Number of humans inserted by [`humans_collection`] callers that do not care.
    pub const DEFAULT_HUMANS: usize = 20;

    const FIRST_NAMES: [&str; 6] = ["Alice", "Bob", "Carol", "Dave", "Erin", "Frank"];
    const LAST_NAMES: [&str; 5] = ["Kirk", "Picard", "Janeway", "Sisko", "Archer"];

    /// Deterministic human document number `i`.
    pub fn human(i: usize) -> (String, DocumentData) {
        let passport_id = format!("passport-{:04}", i);
        let data = payload(json!({
            "passportId": passport_id,
            "firstName": FIRST_NAMES[i % FIRST_NAMES.len()],
            "lastName": LAST_NAMES[i % LAST_NAMES.len()],
            "age": 18 + (i * 7) % 60,
        }));
        (passport_id, data)
    }

    /// Build a payload from a `json!` object literal.
    #[track_caller]
    pub fn payload(value: serde_json::Value) -> DocumentData {
        document_data(value).expect("payload must be a JSON object")
    }

    /// In-memory database named `heroes`.
    pub fn heroes_database() -> Database {
        Database::open(DatabaseConfig::in_memory("heroes")).expect("valid fixture config")
    }

    /// `heroes` database with a `humans` collection holding `amount` humans.
    pub async fn humans_collection(amount: usize) -> LocdocResult<(Database, Collection)> {
        let database = heroes_database();
        let humans = database.collection("humans")?;
        for i in 0..amount {
            let (id, data) = human(i);
            humans.insert(id, data).await?;
        }
        Ok((database, humans))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for local document ids and payloads.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a non-empty local document id.
    pub fn arb_local_id() -> impl Strategy<Value = LocalDocumentId> {
        "[a-zA-Z0-9_:-]{1,24}".prop_filter_map("non-empty id", |s| LocalDocumentId::new(s).ok())
    }

    /// Generate a scalar JSON value (no floats, so equality is exact).
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
        ]
    }

    /// Generate a flat document payload.
    pub fn arb_document_data() -> impl Strategy<Value = DocumentData> {
        prop::collection::btree_map("[a-z]{1,8}", arb_scalar(), 0..8)
            .prop_map(|fields| fields.into_iter().collect())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for locdoc-specific outcomes.

    use super::*;

    /// Assert that a result is the "already exists" failure of a local insert.
    #[track_caller]
    pub fn assert_already_exists<T: std::fmt::Debug>(result: &LocdocResult<T>) {
        match result {
            Err(err) if err.is_already_exists() => {
                assert!(
                    err.to_string().contains("already exists"),
                    "AlreadyExists message lost its phrase: {}",
                    err
                );
            }
            other => panic!("Expected AlreadyExists error, got: {:?}", other),
        }
    }

    /// Assert that a result is an `InvalidState` failure.
    #[track_caller]
    pub fn assert_invalid_state<T: std::fmt::Debug>(result: &LocdocResult<T>) {
        match result {
            Err(err) if err.is_invalid_state() => {}
            other => panic!("Expected InvalidState error, got: {:?}", other),
        }
    }

    /// Assert that a result is a storage failure.
    #[track_caller]
    pub fn assert_storage_failure<T: std::fmt::Debug>(result: &LocdocResult<T>) {
        match result {
            Err(err) if err.is_storage_failure() => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that two handles are the same instance.
    #[track_caller]
    pub fn assert_same_handle(a: &LocalDocumentHandle, b: &LocalDocumentHandle) {
        assert!(a.ptr_eq(b), "Expected identical handles: {a:?} vs {b:?}");
    }

    /// Assert a top-level field of an active handle.
    #[track_caller]
    pub fn assert_field(handle: &LocalDocumentHandle, field: &str, expected: serde_json::Value) {
        let actual = handle
            .get(field)
            .unwrap_or_else(|e| panic!("Reading {} failed: {}", field, e));
        assert_eq!(actual, Some(expected), "Unexpected value for {}", field);
    }
}

// ============================================================================
// TESTS
// ============================================================================
