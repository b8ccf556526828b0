//! Library cover images
//!
//! Each library has one JPEG cover stored under its library id. The
//! filesystem store writes `<dir>/<library_id>.jpg` atomically (temp file
//! plus rename) so a crash never leaves a truncated image behind.

use std::collections::HashMap;
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{StoreError, StoreResult};

/// Extension of stored cover files
const COVER_EXTENSION: &str = "jpg";

/// Binary blob store for library covers
pub trait CoverStore: Send + Sync + 'static {
    /// Store (or replace) the cover for a library
    fn put(&self, library_id: &str, bytes: &[u8]) -> impl Future<Output = StoreResult<()>> + Send;

    /// Fetch the cover for a library, `None` if there is none
    fn get(&self, library_id: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send;

    /// Remove the cover for a library; a missing cover is not an error
    fn delete(&self, library_id: &str) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Cover store writing one file per library into a directory
#[derive(Debug, Clone)]
pub struct FsCoverStore {
    dir: PathBuf,
}

impl FsCoverStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cover file for a library
    pub fn path_for(&self, library_id: &str) -> StoreResult<PathBuf> {
        validate_key(library_id)?;
        Ok(self.dir.join(format!("{}.{}", library_id, COVER_EXTENSION)))
    }
}

impl CoverStore for FsCoverStore {
    async fn put(&self, library_id: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(library_id)?;
        atomic_write(&path, bytes)?;
        debug!(library_id, size = bytes.len(), "Cover stored");
        Ok(())
    }

    async fn get(&self, library_id: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(library_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadError { path, source: e }),
        }
    }

    async fn delete(&self, library_id: &str) -> StoreResult<()> {
        let path = self.path_for(library_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(library_id, "Cover deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(e, path)),
        }
    }
}

/// Cover store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryCoverStore {
    covers: Mutex<HashMap<String, Vec<u8>>>,
    fail: AtomicBool,
}

impl MemoryCoverStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn covers(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.covers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent operation fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, library_id: &str) -> bool {
        self.covers().contains_key(library_id)
    }

    pub fn len(&self) -> usize {
        self.covers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "simulated cover store failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl CoverStore for MemoryCoverStore {
    async fn put(&self, library_id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.check()?;
        validate_key(library_id)?;
        self.covers()
            .insert(library_id.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, library_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.covers().get(library_id).cloned())
    }

    async fn delete(&self, library_id: &str) -> StoreResult<()> {
        self.check()?;
        self.covers().remove(library_id);
        Ok(())
    }
}

/// Library ids become file names, so reject anything that could escape the directory
fn validate_key(library_id: &str) -> StoreResult<()> {
    if library_id.is_empty()
        || library_id.contains('/')
        || library_id.contains('\\')
        || library_id.contains("..")
    {
        return Err(StoreError::InvalidKey(library_id.to_string()));
    }
    Ok(())
}

/// Write data to a file atomically
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StoreError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StoreError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
