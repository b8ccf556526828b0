//! Moledro Core Library
//!
//! This crate provides the core functionality for Moledro, a personal
//! book-cataloging app: books are scanned by ISBN and organized into named
//! libraries.
//!
//! # Architecture
//!
//! - **Document store**: source of truth. One schemaless document per
//!   library, holding its settings and the embedded list of books
//! - **Sync**: `LibrarySync` loads one library, mutates it optimistically
//!   and rewrites the whole document on every change; `LibraryListSync`
//!   follows the current user's libraries through a live subscription
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(SqliteStore::open(&config.database_path())?);
//!
//! let sync = LibrarySync::new(store.clone());
//! if sync.load(&library_id).await {
//!     sync.add_scanned(&HttpLookup::from_config(&config)?, "9780441013593").await?;
//! }
//! ```
//!
//! # Modules
//!
//! - `models`: Library, Book, LibrarySettings, BookInfo
//! - `document`: mapping between store documents and models
//! - `storage`: document store boundary, SQLite and in-memory stores, covers
//! - `sync`: single-library and library-list sync
//! - `catalog`: creating and deleting libraries
//! - `lookup`: ISBN lookup service client
//! - `isbn`: ISBN normalization and validation
//! - `config`: Application configuration

pub mod catalog;
pub mod config;
pub mod document;
pub mod isbn;
pub mod lookup;
pub mod models;
pub mod storage;
pub mod sync;

pub use catalog::{create_library, delete_library, CatalogError};
pub use config::Config;
pub use document::{DecodeError, Document};
pub use lookup::{BookLookup, HttpLookup, LookupError};
pub use models::{Book, BookInfo, Classification, Library, LibrarySettings, LibrarySummary, SortBy};
pub use storage::{
    CoverStore, DocumentStore, Filter, FsCoverStore, MemoryCoverStore, MemoryStore, SqliteStore,
    StoreError, StoreResult, StoredDocument, Subscription,
};
pub use sync::{LibraryList, LibraryListSync, LibrarySync, LoadState, ScanError, SyncError};
