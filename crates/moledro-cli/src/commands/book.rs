//! Book command handlers

use anyhow::{bail, Context as _, Result};

use moledro_core::{HttpLookup, Library, ScanError};

use super::{parse_book_id, Context};
use crate::editor::confirm;
use crate::output::Output;

/// List books, sorted per the library settings or filtered by title
pub async fn list(ctx: &Context, library_id: String, search: Option<String>, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&library_id).await?;
    let library = loaded(sync.library())?;

    let books = match search {
        Some(ref query) => library.search_books(query),
        None => library.sorted_books(),
    };

    output.print_books(&books, &library.settings);
    Ok(())
}

/// Look up a scanned code and add the book
pub async fn scan(ctx: &Context, library_id: String, code: String, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&library_id).await?;
    let lookup = HttpLookup::from_config(&ctx.config).context("Failed to create lookup client")?;

    let book = match sync.add_scanned(&lookup, &code).await {
        Ok(book) => book,
        Err(ScanError::NotFound(code)) => bail!("No book found for ISBN {}", code),
        Err(ScanError::Lookup(e)) => {
            return Err(e).context("Lookup failed. Check your connection and try again.")
        }
        Err(ScanError::Sync(e)) => return Err(e).context("Failed to save library"),
    };

    output.success(&format!("Added: {} by {}", book.title, book.author));
    output.print_book(&book);
    Ok(())
}

/// Remove a book (every copy with that id)
pub async fn remove(ctx: &Context, library_id: String, book_id: String, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&library_id).await?;
    let library = loaded(sync.library())?;
    let id = parse_book_id(&book_id, &library)?;

    if output.should_prompt() {
        if let Some(book) = library.book(id) {
            println!("Remove book: {} - {}", &book.id.to_string()[..8], book.title);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    sync.remove_book(id)
        .await
        .context("Failed to save library")?;

    output.success(&format!("Removed book: {}", id));
    Ok(())
}

/// Add or remove a tag on a book
pub async fn tag(
    ctx: &Context,
    library_id: String,
    book_id: String,
    tag: String,
    remove: bool,
    output: &Output,
) -> Result<()> {
    let tag = tag.trim().to_string();
    if tag.is_empty() {
        bail!("Tag cannot be empty");
    }

    let sync = ctx.load_library(&library_id).await?;
    let library = loaded(sync.library())?;
    let id = parse_book_id(&book_id, &library)?;

    let found = sync
        .update_book(id, |book| {
            if remove {
                book.remove_tag(&tag);
            } else {
                book.add_tag(tag.clone());
            }
        })
        .await
        .context("Failed to save library")?;

    if !found {
        bail!("Book not found: {}", book_id);
    }

    if remove {
        output.success(&format!("Removed tag '{}'", tag));
    } else {
        output.success(&format!("Tagged '{}'", tag));
    }
    Ok(())
}

/// Open the Bookscouter price comparison for a book
pub async fn price(ctx: &Context, library_id: String, book_id: String, output: &Output) -> Result<()> {
    let sync = ctx.load_library(&library_id).await?;
    let library = loaded(sync.library())?;
    let id = parse_book_id(&book_id, &library)?;
    let book = library
        .book(id)
        .ok_or_else(|| anyhow::anyhow!("Book not found: {}", book_id))?;

    let url = book.bookscouter_url();
    if output.should_prompt() {
        open::that(&url).with_context(|| format!("Failed to open {}", url))?;
        output.message(&format!("Opened {}", url));
    } else if output.is_json() {
        println!("{}", serde_json::json!({ "url": url }));
    } else {
        println!("{}", url);
    }
    Ok(())
}

fn loaded(library: Option<Library>) -> Result<Library> {
    library.context("Library is not loaded")
}
