//! Creating and deleting libraries
//!
//! A library is two things in two stores: the library document and its
//! cover image, keyed by the same id. Creation writes the document first
//! (the store assigns the id) and undoes it if the cover cannot be stored.

use thiserror::Error;
use tracing::{info, warn};

use crate::document::encode_library;
use crate::models::Library;
use crate::storage::{CoverStore, DocumentStore, StoreError, LIBRARIES};

/// Errors from catalog operations
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Library name cannot be empty")]
    EmptyName,

    #[error("A cover image is required")]
    MissingCover,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a library with default settings and no books
///
/// Returns the store-assigned library id.
pub async fn create_library<S, C>(
    store: &S,
    covers: &C,
    name: &str,
    owner_uid: &str,
    cover: &[u8],
) -> Result<String, CatalogError>
where
    S: DocumentStore,
    C: CoverStore,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    if cover.is_empty() {
        return Err(CatalogError::MissingCover);
    }

    // Id is not part of the document body
    let document = encode_library(&Library::new(String::new(), name, owner_uid));
    let id = store.create_document(LIBRARIES, document).await?;

    if let Err(e) = covers.put(&id, cover).await {
        warn!(library_id = %id, error = %e, "Failed to store cover, removing library");
        if let Err(cleanup) = store.delete_document(LIBRARIES, &id).await {
            warn!(library_id = %id, error = %cleanup, "Failed to remove library after cover failure");
        }
        return Err(e.into());
    }

    info!(library_id = %id, name, "Library created");
    Ok(id)
}

/// Delete a library document and its cover
///
/// A cover that cannot be removed is logged and left behind.
pub async fn delete_library<S, C>(store: &S, covers: &C, library_id: &str) -> Result<(), CatalogError>
where
    S: DocumentStore,
    C: CoverStore,
{
    store.delete_document(LIBRARIES, library_id).await?;

    if let Err(e) = covers.delete(library_id).await {
        warn!(library_id, error = %e, "Failed to delete library cover");
    }

    info!(library_id, "Library deleted");
    Ok(())
}
