//! Library synchronization
//!
//! Keeps local state in step with the document store.
//!
//! ## Components
//!
//! - `LibrarySync`: one library loaded into memory; every mutation is
//!   applied locally first, then the whole library document is rewritten
//! - `LibraryListSync`: the live list of libraries owned by the current
//!   user, driven by a filtered store subscription
//!
//! Both take the store as an explicit `Arc<S: DocumentStore>`, so tests run
//! them against `MemoryStore`.

mod library;
mod list;

pub use library::{LibrarySync, LoadState, ScanError, SyncError};
pub use list::{LibraryList, LibraryListSync};
