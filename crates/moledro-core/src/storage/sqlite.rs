//! SQLite-backed document store
//!
//! Persists each document as JSON text in the `documents` table. After every
//! write through this store the written collection is re-read and fanned out
//! to its subscribers. Writes made by other connections to the same database
//! file, including other processes, are picked up by polling
//! `PRAGMA data_version` while a subscription is open.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::schema::{init_schema, needs_init};
use super::{
    generate_document_id, DocumentStore, Filter, StoreError, StoreResult, StoredDocument,
    Subscribers, Subscription,
};
use crate::document::Document;

/// How often a file-backed store checks for writes from other connections
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Document store persisted to a local SQLite database
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    subscribers: Arc<Subscribers>,
    /// `None` for in-memory databases, which no one else can write
    poll_interval: Option<Duration>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn, Some(DEFAULT_POLL_INTERVAL))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    /// Check for outside writes at `interval` instead of the default
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if self.poll_interval.is_some() {
            self.poll_interval = Some(interval);
        }
        self
    }

    fn with_connection(conn: Connection, poll_interval: Option<Duration>) -> StoreResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Subscribers::new(),
            poll_interval,
            watcher: Mutex::new(None),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> StoreResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Spawn the outside-change poller unless it is already running
    fn ensure_watcher(&self) -> StoreResult<()> {
        let Some(interval) = self.poll_interval else {
            return Ok(());
        };

        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let version = data_version(&self.conn())?;
        *watcher = Some(tokio::spawn(watch_outside_changes(
            Arc::downgrade(&self.conn),
            Arc::downgrade(&self.subscribers),
            interval,
            version,
        )));
        debug!(?interval, "Watching database for outside changes");
        Ok(())
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = watcher.take() {
            handle.abort();
        }
    }
}

impl DocumentStore for SqliteStore {
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let text: Option<String> = self
            .conn()
            .query_row(
                "SELECT data FROM documents WHERE collection = ? AND id = ?",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set_document(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let conn = self.conn();
        upsert(&conn, collection, id, document)?;
        publish(&conn, &self.subscribers, collection);
        Ok(())
    }

    async fn create_document(&self, collection: &str, document: Document) -> StoreResult<String> {
        let id = generate_document_id();
        let conn = self.conn();
        upsert(&conn, collection, &id, document)?;
        publish(&conn, &self.subscribers, collection);
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            params![collection, id],
        )?;
        if deleted > 0 {
            debug!(collection, id, "Document deleted");
            publish(&conn, &self.subscribers, collection);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> StoreResult<Subscription> {
        self.ensure_watcher()?;
        let conn = self.conn();
        let documents = read_collection(&conn, collection)?;
        Ok(self.subscribers.register(collection, filter, &documents))
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read every document in a collection, ordered by id
///
/// Rows whose body is not valid JSON are skipped.
fn read_collection(conn: &Connection, collection: &str) -> StoreResult<Vec<StoredDocument>> {
    let mut stmt =
        conn.prepare("SELECT id, data FROM documents WHERE collection = ? ORDER BY id")?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, text) = row?;
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => documents.push(StoredDocument::new(id, data)),
            Err(e) => warn!(collection, id = %id, error = %e, "Skipping unreadable document"),
        }
    }
    Ok(documents)
}

fn upsert(conn: &Connection, collection: &str, id: &str, document: Document) -> StoreResult<()> {
    let text = serde_json::to_string(&Value::Object(document))?;
    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO documents (collection, id, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![collection, id, text, now],
    )?;
    debug!(collection, id, "Document written");
    Ok(())
}

/// Send the current collection to its subscribers
///
/// Callers hold the connection lock, so snapshots go out in write order.
fn publish(conn: &Connection, subscribers: &Subscribers, collection: &str) {
    if !subscribers.watches(collection) {
        return;
    }
    match read_collection(conn, collection) {
        Ok(documents) => subscribers.notify(collection, &documents),
        Err(e) => warn!(collection, error = %e, "Failed to read snapshot for subscribers"),
    }
}

/// Changes whenever another connection commits to the database file
fn data_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

async fn watch_outside_changes(
    conn: Weak<Mutex<Connection>>,
    subscribers: Weak<Subscribers>,
    interval: Duration,
    mut last_version: i64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let (Some(conn), Some(subscribers)) = (conn.upgrade(), subscribers.upgrade()) else {
            break;
        };
        republish_outside_changes(&conn, &subscribers, &mut last_version);
    }
    debug!("Stopped watching database");
}

fn republish_outside_changes(
    conn: &Mutex<Connection>,
    subscribers: &Subscribers,
    last_version: &mut i64,
) {
    let conn = lock(conn);
    let version = match data_version(&conn) {
        Ok(version) => version,
        Err(e) => {
            warn!(error = %e, "Failed to check database for outside changes");
            return;
        }
    };
    if version == *last_version {
        return;
    }
    *last_version = version;

    debug!(version, "Database changed by another connection");
    for collection in subscribers.collections() {
        publish(&conn, subscribers, &collection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LIBRARIES;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_document(LIBRARIES, "a").await.unwrap().is_none());

        store
            .set_document(LIBRARIES, "a", doc(json!({ "name": "Den", "books": [] })))
            .await
            .unwrap();
        let value = store.get_document(LIBRARIES, "a").await.unwrap().unwrap();
        assert_eq!(value, json!({ "name": "Den", "books": [] }));
    }

    #[tokio::test]
    async fn test_set_overwrites_whole_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_document(LIBRARIES, "a", doc(json!({ "name": "Den", "extra": 1 })))
            .await
            .unwrap();
        store
            .set_document(LIBRARIES, "a", doc(json!({ "name": "Study" })))
            .await
            .unwrap();

        let value = store.get_document(LIBRARIES, "a").await.unwrap().unwrap();
        assert_eq!(value, json!({ "name": "Study" }));
        assert_eq!(store.count(LIBRARIES).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .create_document(LIBRARIES, doc(json!({ "name": "Den" })))
            .await
            .unwrap();
        assert_eq!(id.len(), 20);
        assert!(store.get_document(LIBRARIES, &id).await.unwrap().is_some());

        store.delete_document(LIBRARIES, &id).await.unwrap();
        assert!(store.get_document(LIBRARIES, &id).await.unwrap().is_none());

        // Missing document
        store.delete_document(LIBRARIES, &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_collections_are_separate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_document("other", "a", doc(json!({ "x": 1 })))
            .await
            .unwrap();
        assert!(store.get_document(LIBRARIES, "a").await.unwrap().is_none());
        assert_eq!(store.count(LIBRARIES).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscription_snapshots() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_document(LIBRARIES, "a", doc(json!({ "ownerUID": "u1" })))
            .await
            .unwrap();
        store
            .set_document(LIBRARIES, "b", doc(json!({ "ownerUID": "u2" })))
            .await
            .unwrap();

        let mut sub = store
            .subscribe(LIBRARIES, Filter::field_equals("ownerUID", "u1"))
            .await
            .unwrap();
        let initial = sub.recv().await.unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].id, "a");

        store
            .set_document(LIBRARIES, "c", doc(json!({ "ownerUID": "u1" })))
            .await
            .unwrap();
        let ids: Vec<_> = sub.recv().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "c"]);

        sub.unsubscribe();
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_document(LIBRARIES, "good", doc(json!({ "ownerUID": "u1" })))
            .await
            .unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO documents (collection, id, data, created_at, updated_at)
                 VALUES ('libraries', 'bad', '{not json', 0, 0)",
                [],
            )
            .unwrap();

        let mut sub = store.subscribe(LIBRARIES, Filter::All).await.unwrap();
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(store.get_document(LIBRARIES, "bad").await.is_err());
    }

    #[tokio::test]
    async fn test_writes_from_another_connection_reach_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("moledro.db");

        let reader = SqliteStore::open(&path)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let writer = SqliteStore::open(&path).unwrap();

        let mut sub = reader
            .subscribe(LIBRARIES, Filter::field_equals("ownerUID", "u1"))
            .await
            .unwrap();
        assert!(sub.recv().await.unwrap().is_empty());

        writer
            .set_document(LIBRARIES, "a", doc(json!({ "ownerUID": "u1" })))
            .await
            .unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no snapshot after outside write")
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "a");

        writer.delete_document(LIBRARIES, "a").await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no snapshot after outside delete")
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_own_writes_are_published_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("moledro.db"))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));

        let mut sub = store.subscribe(LIBRARIES, Filter::All).await.unwrap();
        sub.recv().await.unwrap();

        store
            .set_document(LIBRARIES, "a", doc(json!({ "name": "Den" })))
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap().len(), 1);

        // Several poll intervals pass without a duplicate snapshot
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_end_on_latest_snapshot() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut sub = store.subscribe(LIBRARIES, Filter::All).await.unwrap();
        sub.recv().await.unwrap();

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .set_document(LIBRARIES, &format!("lib{i:02}"), doc(json!({ "n": i })))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let mut sizes = Vec::new();
        while let Some(snapshot) = sub.try_recv() {
            sizes.push(snapshot.len());
        }
        assert_eq!(sizes.len(), 16);
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("moledro.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set_document(LIBRARIES, "a", doc(json!({ "name": "Den" })))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let value = store.get_document(LIBRARIES, "a").await.unwrap().unwrap();
        assert_eq!(value["name"], "Den");
    }
}
