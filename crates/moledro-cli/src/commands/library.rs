//! Library command handlers

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::sync::watch;

use moledro_core::{
    create_library, delete_library, LibraryList, LibraryListSync, LibrarySettings, LibrarySync,
    SortBy, SqliteStore,
};

use super::Context;
use crate::editor::confirm;
use crate::output::Output;

/// Requested changes to library settings
#[derive(Debug, Default)]
pub struct SettingsUpdate {
    pub show_ddc: Option<bool>,
    pub show_subjects: Option<bool>,
    pub show_tags: Option<bool>,
    pub show_preview: Option<bool>,
    pub sort_by: Option<SortBy>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.show_ddc.is_none()
            && self.show_subjects.is_none()
            && self.show_tags.is_none()
            && self.show_preview.is_none()
            && self.sort_by.is_none()
    }

    /// Apply to `settings`, leaving unspecified fields as they are
    pub fn apply(&self, settings: &LibrarySettings) -> LibrarySettings {
        LibrarySettings {
            show_ddc: self.show_ddc.unwrap_or(settings.show_ddc),
            show_fast_subjects: self.show_subjects.unwrap_or(settings.show_fast_subjects),
            show_tags: self.show_tags.unwrap_or(settings.show_tags),
            show_preview: self.show_preview.unwrap_or(settings.show_preview),
            sort_by: self.sort_by.unwrap_or(settings.sort_by),
        }
    }
}

/// List the current user's libraries
pub async fn list(ctx: &Context, output: &Output) -> Result<()> {
    let mut sync = LibraryListSync::new(ctx.store.clone());
    let mut rx = sync.subscribe();

    let Some(user) = ctx.config.current_user() else {
        output.message("No user configured; set one with `moledro config set user_id <id>`.");
        output.print_library_summaries(&[]);
        return Ok(());
    };

    sync.start(Some(user))
        .await
        .context("Failed to subscribe to libraries")?;
    let list = first_snapshot(&mut rx).await;
    sync.stop().await;

    output.print_library_summaries(&list?.summaries());
    Ok(())
}

/// Print the library list every time it changes, until Ctrl-C
pub async fn watch(ctx: &Context, output: &Output) -> Result<()> {
    let user = ctx.require_user()?;

    let mut sync = LibraryListSync::new(ctx.store.clone());
    let mut rx = sync.subscribe();
    sync.start(Some(user))
        .await
        .context("Failed to subscribe to libraries")?;

    output.message("Watching libraries (Ctrl-C to stop)...");

    let result = watch_loop(&mut rx, output).await;
    sync.stop().await;
    result
}

async fn watch_loop(rx: &mut watch::Receiver<LibraryList>, output: &Output) -> Result<()> {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                changed.context("Library list closed")?;
                let list = rx.borrow_and_update().clone();
                // Generation 0 is the reset on start, not a snapshot
                if list.generation > 0 {
                    output.print_library_summaries(&list.summaries());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}

async fn first_snapshot(rx: &mut watch::Receiver<LibraryList>) -> Result<LibraryList> {
    let list = rx
        .wait_for(|l| l.generation >= 1)
        .await
        .context("Library list closed before the first snapshot")?;
    Ok(list.clone())
}

/// Create a library owned by the current user
pub async fn create(ctx: &Context, name: String, cover: &Path, output: &Output) -> Result<()> {
    let user = ctx.require_user()?;
    let bytes =
        std::fs::read(cover).with_context(|| format!("Failed to read cover image {:?}", cover))?;

    let id = create_library(&*ctx.store, &ctx.covers, &name, user, &bytes)
        .await
        .context("Failed to create library")?;

    output.success(&format!("Created library: {}", id));
    if output.is_quiet() {
        println!("{}", id);
    }
    Ok(())
}

/// Delete a library and its cover
pub async fn delete(ctx: &Context, id: String, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&id).await?;

    if output.should_prompt() {
        if let Some(library) = sync.library() {
            println!(
                "Delete library: {} ({} book(s))",
                library.name,
                library.books.len()
            );
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    delete_library(&*ctx.store, &ctx.covers, &id)
        .await
        .context("Failed to delete library")?;

    output.success(&format!("Deleted library: {}", id));
    Ok(())
}

/// Show a library and its settings
pub async fn show(ctx: &Context, id: String, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&id).await?;
    if let Some(library) = sync.library() {
        output.print_library(&library);
    }
    Ok(())
}

/// Show or change library settings
pub async fn settings(
    ctx: &Context,
    id: String,
    update: SettingsUpdate,
    output: &Output,
) -> Result<()> {
    let sync = ctx.load_library(&id).await?;
    let current = current_settings(&sync)?;

    if update.is_empty() {
        output.print_settings(&current);
        return Ok(());
    }

    let settings = update.apply(&current);
    sync.set_settings(settings.clone())
        .await
        .context("Failed to save settings")?;

    output.success("Settings updated");
    output.print_settings(&settings);
    Ok(())
}

fn current_settings(sync: &LibrarySync<SqliteStore>) -> Result<LibrarySettings> {
    sync.library()
        .map(|l| l.settings)
        .context("Library is not loaded")
}
