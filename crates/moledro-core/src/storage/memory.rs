//! In-memory document store
//!
//! Keeps every collection in process memory. Besides serving as a fake
//! store in tests it records every write and can be told to fail reads or
//! writes, so callers' failure paths can be exercised.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{
    generate_document_id, DocumentStore, Filter, StoreError, StoreResult, StoredDocument,
    Subscribers, Subscription,
};
use crate::document::Document;

/// A full-document write observed by the store
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub collection: String,
    pub id: String,
    pub document: Document,
}

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Document store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
    writes: Mutex<Vec<RecordedWrite>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    subscribers: Arc<Subscribers>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<RecordedWrite>> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent reads (get and subscribe) fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes (set, create, delete) fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Put a raw value in place without recording a write
    ///
    /// Subscribers are still notified, as they would be for a change made
    /// by another client.
    pub fn insert_raw(&self, collection: &str, id: &str, data: Value) {
        let mut collections = self.collections();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.publish(&collections, collection);
    }

    /// Current value of a document, bypassing failure injection
    pub fn peek(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Every full-document write issued through `set_document`
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.recorded().clone()
    }

    pub fn write_count(&self) -> usize {
        self.recorded().len()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscribers.len()
    }

    /// End every live subscription, as a store going offline would
    pub fn close_subscriptions(&self) {
        self.subscribers.close_all();
    }

    /// Send the current collection to its subscribers
    ///
    /// Runs under the collections lock, so snapshots go out in write order.
    fn publish(&self, collections: &Collections, collection: &str) {
        if self.subscribers.watches(collection) {
            self.subscribers
                .notify(collection, &snapshot(collections, collection));
        }
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        self.check_reads()?;
        Ok(self.peek(collection, id))
    }

    async fn set_document(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        self.check_writes()?;
        self.recorded().push(RecordedWrite {
            collection: collection.to_string(),
            id: id.to_string(),
            document: document.clone(),
        });
        let mut collections = self.collections();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Value::Object(document));
        self.publish(&collections, collection);
        Ok(())
    }

    async fn create_document(&self, collection: &str, document: Document) -> StoreResult<String> {
        self.check_writes()?;
        let id = generate_document_id();
        let mut collections = self.collections();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), Value::Object(document));
        self.publish(&collections, collection);
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_writes()?;
        let mut collections = self.collections();
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.publish(&collections, collection);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> StoreResult<Subscription> {
        self.check_reads()?;
        let collections = self.collections();
        Ok(self
            .subscribers
            .register(collection, filter, &snapshot(&collections, collection)))
    }
}

fn snapshot(collections: &Collections, collection: &str) -> Vec<StoredDocument> {
    collections
        .get(collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
                .collect()
        })
        .unwrap_or_default()
}
