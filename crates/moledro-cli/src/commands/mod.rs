//! Command handlers

pub mod book;
pub mod config;
pub mod library;

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tracing::debug;
use uuid::Uuid;

use moledro_core::{Book, Config, FsCoverStore, Library, LibrarySync, SqliteStore};

/// Stores and settings shared by the commands that touch library data
pub struct Context {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub covers: FsCoverStore,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.database_path();
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        let covers = FsCoverStore::new(config.covers_dir());
        debug!(database = ?db_path, covers = ?covers.dir(), "Stores opened");

        Ok(Self {
            config,
            store: Arc::new(store),
            covers,
        })
    }

    /// The configured user, required by commands that create libraries
    pub fn require_user(&self) -> Result<&str> {
        match self.config.current_user() {
            Some(user) => Ok(user),
            None => bail!(
                "No user configured.\n\
                 Set one with: moledro config set user_id <id>"
            ),
        }
    }

    /// Load a library for reading or editing
    pub async fn load_library(&self, id: &str) -> Result<LibrarySync<SqliteStore>> {
        let sync = LibrarySync::new(self.store.clone());
        if !sync.load(id).await {
            bail!("Library not found: {}", id);
        }
        Ok(sync)
    }
}

/// Resolve a book id from a full UUID or a unique prefix
pub fn parse_book_id(id: &str, library: &Library) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }

    // Duplicate entries share an id and count once
    let mut matches: Vec<&Book> = Vec::new();
    for book in library
        .books
        .iter()
        .filter(|b| b.id.to_string().starts_with(id))
    {
        if !matches.iter().any(|m| m.id == book.id) {
            matches.push(book);
        }
    }

    match matches.len() {
        0 => bail!("No book found matching: {}", id),
        1 => Ok(matches[0].id),
        _ => {
            eprintln!("Multiple books match '{}':", id);
            for book in &matches {
                eprintln!("  {} - {}", book.id, book.title);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moledro_core::BookInfo;

    fn book(title: &str) -> Book {
        Book::from_info(
            BookInfo {
                title: title.to_string(),
                author: "A".to_string(),
                isbn: "9780441013593".to_string(),
                image: None,
                classification: None,
            },
            "u1",
        )
    }

    #[test]
    fn test_parse_book_id() {
        let mut library = Library::new("lib1", "Den", "u1");
        let dune = book("Dune");
        library.books.push(dune.clone());
        library.books.push(dune.clone());

        assert_eq!(parse_book_id(&dune.id.to_string(), &library).unwrap(), dune.id);
        assert_eq!(
            parse_book_id(&dune.id.to_string()[..8], &library).unwrap(),
            dune.id
        );
        assert!(parse_book_id("zzzz", &library).is_err());
    }

    #[test]
    fn test_parse_book_id_ambiguous() {
        let mut library = Library::new("lib1", "Den", "u1");
        library.books.push(book("Dune"));
        library.books.push(book("Emma"));

        // The empty prefix matches every book
        assert!(parse_book_id("", &library).is_err());
    }

    #[tokio::test]
    async fn test_context_load_library() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            user_id: Some("u1".to_string()),
            ..Config::default()
        };
        let ctx = Context::open(config).unwrap();
        assert_eq!(ctx.require_user().unwrap(), "u1");

        assert!(ctx.load_library("missing").await.is_err());

        let id = moledro_core::create_library(&*ctx.store, &ctx.covers, "Den", "u1", b"jpeg")
            .await
            .unwrap();
        let sync = ctx.load_library(&id).await.unwrap();
        assert_eq!(sync.library().unwrap().name, "Den");
    }
}
