//! Library-list sync
//!
//! Maintains the live list of libraries owned by the current user. `start`
//! opens one filtered subscription and spawns a task that replaces the whole
//! list on every snapshot; `stop` shuts the task down and releases the
//! subscription.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::document::{decode_library_value, keys};
use crate::models::{Library, LibrarySummary};
use crate::storage::{DocumentStore, Filter, StoreResult, StoredDocument, Subscription, LIBRARIES};

/// Commands sent to the list task
#[derive(Debug, Clone)]
enum ListCommand {
    /// Release the subscription and exit
    Shutdown,
}

/// The current list of libraries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryList {
    pub libraries: Vec<Library>,
    /// Number of snapshots applied since the last `start`
    pub generation: u64,
}

impl LibraryList {
    pub fn summaries(&self) -> Vec<LibrarySummary> {
        self.libraries.iter().map(LibrarySummary::from).collect()
    }
}

struct ListTask {
    command_tx: mpsc::Sender<ListCommand>,
    handle: JoinHandle<()>,
}

/// Live list of the current user's libraries
pub struct LibraryListSync<S> {
    store: Arc<S>,
    list: Arc<watch::Sender<LibraryList>>,
    task: Option<ListTask>,
}

impl<S: DocumentStore> LibraryListSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (list, _) = watch::channel(LibraryList::default());
        Self {
            store,
            list: Arc::new(list),
            task: None,
        }
    }

    /// Watch the list
    pub fn subscribe(&self) -> watch::Receiver<LibraryList> {
        self.list.subscribe()
    }

    /// Current libraries
    pub fn libraries(&self) -> Vec<Library> {
        self.list.borrow().libraries.clone()
    }

    /// Whether a subscription is held
    ///
    /// Turns false on its own if the store closes the subscription.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Start following the libraries owned by `current_user`
    ///
    /// Without a user the list stays empty and no subscription is opened.
    /// Calling `start` while already running does nothing. A task the store
    /// already shut down is replaced.
    pub async fn start(&mut self, current_user: Option<&str>) -> StoreResult<()> {
        if self.is_running() {
            debug!("Library list already running");
            return Ok(());
        }
        if self.task.take().is_some() {
            debug!("Replacing finished library list task");
        }

        self.list.send_replace(LibraryList::default());

        let Some(user) = current_user else {
            info!("No current user, library list stays empty");
            return Ok(());
        };

        let subscription = self
            .store
            .subscribe(LIBRARIES, Filter::field_equals(keys::OWNER_UID, user))
            .await?;

        let (command_tx, command_rx) = mpsc::channel(4);
        let handle = tokio::spawn(run_list_task(subscription, command_rx, self.list.clone()));
        self.task = Some(ListTask { command_tx, handle });

        debug!(user, "Library list started");
        Ok(())
    }

    /// Release the subscription and clear the list
    ///
    /// Safe to call more than once, or without a prior `start`.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // Send fails only if the task already exited
            let _ = task.command_tx.send(ListCommand::Shutdown).await;
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Library list task ended abnormally");
            }
            debug!("Library list stopped");
        }
        self.list.send_replace(LibraryList::default());
    }
}

impl<S> Drop for LibraryListSync<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.handle.is_finished() {
                warn!("Library list dropped without stop, aborting task");
                task.handle.abort();
            }
        }
    }
}

async fn run_list_task(
    mut subscription: Subscription,
    mut command_rx: mpsc::Receiver<ListCommand>,
    list: Arc<watch::Sender<LibraryList>>,
) {
    loop {
        tokio::select! {
            snapshot = subscription.recv() => match snapshot {
                Some(documents) => {
                    let libraries = decode_snapshot(&documents);
                    debug!(count = libraries.len(), "Library list updated");
                    list.send_modify(|current| {
                        current.libraries = libraries;
                        current.generation += 1;
                    });
                }
                None => {
                    warn!("Document store closed the library subscription");
                    list.send_replace(LibraryList::default());
                    break;
                }
            },
            command = command_rx.recv() => match command {
                Some(ListCommand::Shutdown) | None => break,
            },
        }
    }
}

/// Decode every library in a snapshot, dropping records that are not libraries
pub(crate) fn decode_snapshot(documents: &[StoredDocument]) -> Vec<Library> {
    documents
        .iter()
        .filter_map(|doc| match decode_library_value(&doc.data, &doc.id) {
            Ok(library) => Some(library),
            Err(e) => {
                warn!(library_id = %doc.id, error = %e, "Dropping unreadable library");
                None
            }
        })
        .collect()
}
