//! Storage layer
//!
//! The document store is a remote, schemaless, per-document store. This
//! module defines the boundary the sync components talk to, plus the
//! concrete stores that implement it.
//!
//! ## Architecture
//!
//! - `DocumentStore`: get / full overwrite / create / delete, and live
//!   filtered subscriptions that emit a full snapshot on every change
//! - `MemoryStore`: in-process store, used by tests and demos
//! - `SqliteStore`: documents as JSON in a local SQLite database
//! - `CoverStore`: binary cover images keyed by library id

pub mod covers;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod subscription;

use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::document::Document;

pub use covers::{CoverStore, FsCoverStore, MemoryCoverStore};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use subscription::{Snapshot, Subscribers, Subscription};

/// Collection holding one document per library
pub const LIBRARIES: &str = "libraries";

/// Length of store-assigned document ids
const DOCUMENT_ID_LEN: usize = 20;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A document together with its id, as delivered in snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Query filter for subscriptions
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the collection
    All,
    /// Documents whose top-level `field` equals `value`
    FieldEquals { field: String, value: Value },
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check a document body against the filter
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals { field, value } => data.get(field) == Some(value),
        }
    }

    /// The matching subset of `documents`, order preserved
    pub fn select(&self, documents: &[StoredDocument]) -> Vec<StoredDocument> {
        documents
            .iter()
            .filter(|d| self.matches(&d.data))
            .cloned()
            .collect()
    }
}

/// Boundary to a remote document store
///
/// All operations are asynchronous. `set_document` replaces the entire
/// document; there are no partial updates.
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a single document, `None` if it does not exist
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = StoreResult<Option<Value>>> + Send;

    /// Create or fully overwrite a document
    fn set_document(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Create a document under a store-assigned id and return that id
    fn create_document(
        &self,
        collection: &str,
        document: Document,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    /// Delete a document; deleting a missing document is not an error
    fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Open a live subscription on `collection`
    ///
    /// The first snapshot is available immediately; a new one follows every
    /// change to the collection until the subscription is released.
    fn subscribe(
        &self,
        collection: &str,
        filter: Filter,
    ) -> impl Future<Output = StoreResult<Subscription>> + Send;
}

/// Generate a store-assigned document id
pub fn generate_document_id() -> String {
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    first
        .as_bytes()
        .iter()
        .chain(second.as_bytes())
        .take(DOCUMENT_ID_LEN)
        .map(|b| ID_ALPHABET[*b as usize % ID_ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_field_equals() {
        let filter = Filter::field_equals("ownerUID", "a");
        assert!(filter.matches(&json!({ "ownerUID": "a", "name": "x" })));
        assert!(!filter.matches(&json!({ "ownerUID": "b" })));
        assert!(!filter.matches(&json!({ "name": "x" })));
        assert!(!filter.matches(&json!("a")));
        assert!(Filter::All.matches(&json!(null)));
    }

    #[test]
    fn test_filter_select_preserves_order() {
        let docs = vec![
            StoredDocument::new("1", json!({ "ownerUID": "a" })),
            StoredDocument::new("2", json!({ "ownerUID": "b" })),
            StoredDocument::new("3", json!({ "ownerUID": "a" })),
        ];
        let ids: Vec<_> = Filter::field_equals("ownerUID", "a")
            .select(&docs)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_generate_document_id() {
        let id = generate_document_id();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_document_id());
    }
}
