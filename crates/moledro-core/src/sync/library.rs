//! Single-library sync
//!
//! Loads one library document, applies local mutations optimistically and
//! writes the whole aggregate back after every mutation.
//!
//! ## State
//!
//! `Unloaded -> Loading -> Loaded`; mutations keep the sync in `Loaded`.
//! The local state is readable at any time and always shows the optimistic
//! value. The last value the store accepted is tracked separately, so a
//! failed commit can be retried with `commit` or undone with `revert`.
//! A failed commit is never rolled back automatically.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{decode_library_value, encode_library};
use crate::lookup::{BookLookup, LookupError};
use crate::models::{Book, Library, LibrarySettings};
use crate::storage::{DocumentStore, StoreError, LIBRARIES};

/// Load state of a `LibrarySync`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// Nothing loaded (initial state, or the last load failed)
    Unloaded,
    /// A fetch is in flight
    Loading { library_id: String },
    /// Library available locally
    Loaded(Library),
}

impl LoadState {
    pub fn library(&self) -> Option<&Library> {
        match self {
            LoadState::Loaded(library) => Some(library),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }
}

/// Errors from library mutations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Mutation attempted before a library was loaded
    #[error("No library loaded")]
    NotLoaded,

    /// The book belongs to someone other than the library's owner
    #[error("Book owned by '{book_owner}' cannot be added to a library owned by '{library_owner}'")]
    OwnerMismatch {
        library_owner: String,
        book_owner: String,
    },

    /// The local change was kept but could not be written
    #[error("Failed to save library '{library_id}': {source}")]
    Commit {
        library_id: String,
        #[source]
        source: StoreError,
    },
}

/// Why a scanned code did not produce a new book
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No book found for '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Keeps one library in memory and mirrors every change to the store
pub struct LibrarySync<S> {
    store: Arc<S>,
    state: watch::Sender<LoadState>,
    /// Last aggregate the store accepted
    confirmed: watch::Sender<Option<Library>>,
}

impl<S: DocumentStore> LibrarySync<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (state, _) = watch::channel(LoadState::Unloaded);
        let (confirmed, _) = watch::channel(None);
        Self {
            store,
            state,
            confirmed,
        }
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// The loaded library (optimistic view)
    pub fn library(&self) -> Option<Library> {
        self.state.borrow().library().cloned()
    }

    /// Id of the loaded library
    pub fn library_id(&self) -> Option<String> {
        self.state.borrow().library().map(|l| l.id.clone())
    }

    /// The last library value the store accepted
    pub fn confirmed(&self) -> Option<Library> {
        self.confirmed.borrow().clone()
    }

    /// Watch state changes
    pub fn watch(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Whether local state differs from what was last persisted
    pub fn is_dirty(&self) -> bool {
        let state = self.state.borrow();
        let confirmed = self.confirmed.borrow();
        match (state.library(), confirmed.as_ref()) {
            (Some(local), Some(remote)) => local != remote,
            _ => false,
        }
    }

    /// Fetch and decode a library
    ///
    /// Returns whether the library is now loaded. A missing document, a
    /// fetch error or a non-object document are logged and leave the sync
    /// `Unloaded`; call `load` again to retry.
    pub async fn load(&self, library_id: &str) -> bool {
        self.state.send_replace(LoadState::Loading {
            library_id: library_id.to_string(),
        });

        let library = match self.store.get_document(LIBRARIES, library_id).await {
            Ok(Some(value)) => match decode_library_value(&value, library_id) {
                Ok(library) => Some(library),
                Err(e) => {
                    warn!(library_id, error = %e, "Library document unreadable");
                    None
                }
            },
            Ok(None) => {
                warn!(library_id, "Library not found");
                None
            }
            Err(e) => {
                warn!(library_id, error = %e, "Failed to fetch library");
                None
            }
        };

        match library {
            Some(library) => {
                debug!(library_id, books = library.books.len(), "Library loaded");
                self.confirmed.send_replace(Some(library.clone()));
                self.state.send_replace(LoadState::Loaded(library));
                true
            }
            None => {
                self.confirmed.send_replace(None);
                self.state.send_replace(LoadState::Unloaded);
                false
            }
        }
    }

    /// Append a book
    ///
    /// The book must be owned by the library's owner; anything else is
    /// rejected without a write. No duplicate check: adding the same book
    /// twice yields two entries.
    pub async fn add_book(&self, book: Book) -> Result<(), SyncError> {
        let library_owner = self.owner_uid()?;
        if book.owner_uid != library_owner {
            warn!(
                library_owner = %library_owner,
                book_owner = %book.owner_uid,
                "Rejecting book from another owner"
            );
            return Err(SyncError::OwnerMismatch {
                library_owner,
                book_owner: book.owner_uid,
            });
        }

        self.mutate(|library| {
            library.books.push(book);
            true
        })
        .await
        .map(|_| ())
    }

    /// Remove every entry with the given id
    ///
    /// Commits even if nothing matched.
    pub async fn remove_book(&self, id: Uuid) -> Result<(), SyncError> {
        self.mutate(|library| {
            library.books.retain(|b| b.id != id);
            true
        })
        .await
        .map(|_| ())
    }

    /// Replace the library settings wholesale
    pub async fn set_settings(&self, settings: LibrarySettings) -> Result<(), SyncError> {
        self.mutate(|library| {
            library.settings = settings;
            true
        })
        .await
        .map(|_| ())
    }

    /// Edit every entry with the given id in place
    ///
    /// Returns false (and writes nothing) when no entry matches.
    pub async fn update_book<F>(&self, id: Uuid, mut edit: F) -> Result<bool, SyncError>
    where
        F: FnMut(&mut Book),
    {
        self.mutate(|library| {
            let mut found = false;
            for book in library.books.iter_mut().filter(|b| b.id == id) {
                edit(book);
                found = true;
            }
            found
        })
        .await
    }

    /// Look up a scanned code and append the resulting book
    ///
    /// The new book is owned by the library's owner. Not-found and lookup
    /// failures leave the library untouched.
    pub async fn add_scanned<L: BookLookup>(
        &self,
        lookup: &L,
        code: &str,
    ) -> Result<Book, ScanError> {
        let owner_uid = self.owner_uid()?;

        let info = lookup
            .lookup(code)
            .await?
            .ok_or_else(|| ScanError::NotFound(code.trim().to_string()))?;

        let book = Book::from_info(info, owner_uid);
        self.add_book(book.clone()).await?;
        Ok(book)
    }

    /// Write the current local state again
    pub async fn commit(&self) -> Result<(), SyncError> {
        let library = self.library().ok_or(SyncError::NotLoaded)?;
        self.persist(library).await
    }

    /// Throw away local changes the store never accepted
    ///
    /// Returns whether anything changed.
    pub fn revert(&self) -> bool {
        let Some(confirmed) = self.confirmed() else {
            return false;
        };
        self.state.send_if_modified(|state| match state {
            LoadState::Loaded(library) if *library != confirmed => {
                *library = confirmed;
                true
            }
            _ => false,
        })
    }

    fn owner_uid(&self) -> Result<String, SyncError> {
        self.state
            .borrow()
            .library()
            .map(|l| l.owner_uid.clone())
            .ok_or(SyncError::NotLoaded)
    }

    /// Apply `change` to the loaded library and commit if it reports a change
    async fn mutate<F>(&self, change: F) -> Result<bool, SyncError>
    where
        F: FnOnce(&mut Library) -> bool,
    {
        let mut loaded = false;
        let mut snapshot = None;
        self.state.send_if_modified(|state| match state {
            LoadState::Loaded(library) => {
                loaded = true;
                if change(library) {
                    snapshot = Some(library.clone());
                    true
                } else {
                    false
                }
            }
            _ => false,
        });

        if !loaded {
            return Err(SyncError::NotLoaded);
        }
        match snapshot {
            Some(library) => self.persist(library).await.map(|_| true),
            None => Ok(false),
        }
    }

    async fn persist(&self, library: Library) -> Result<(), SyncError> {
        let document = encode_library(&library);
        match self
            .store
            .set_document(LIBRARIES, &library.id, document)
            .await
        {
            Ok(()) => {
                info!(library_id = %library.id, books = library.books.len(), "Library saved");
                self.confirmed.send_replace(Some(library));
                Ok(())
            }
            Err(e) => {
                warn!(library_id = %library.id, error = %e, "Failed to save library");
                Err(SyncError::Commit {
                    library_id: library.id,
                    source: e,
                })
            }
        }
    }
}
