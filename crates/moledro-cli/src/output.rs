//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use moledro_core::{Book, Library, LibrarySettings, LibrarySummary};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a list of libraries
    pub fn print_library_summaries(&self, libraries: &[LibrarySummary]) {
        match self.format {
            OutputFormat::Human => {
                if libraries.is_empty() {
                    println!("No libraries found.");
                    return;
                }
                for library in libraries {
                    println!(
                        "{} | {} | {} book(s)",
                        library.id,
                        truncate(&library.name, 40),
                        library.book_count
                    );
                }
                println!("\n{} library(ies)", libraries.len());
            }
            OutputFormat::Json => print_json(&libraries),
            OutputFormat::Quiet => {
                for library in libraries {
                    println!("{}", library.id);
                }
            }
        }
    }

    /// Print a single library with its settings
    pub fn print_library(&self, library: &Library) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", library.id);
                println!("Name:     {}", library.name);
                println!("Owner:    {}", library.owner_uid);
                println!("Books:    {}", library.books.len());
                println!();
                self.print_settings(&library.settings);
            }
            OutputFormat::Json => print_json(library),
            OutputFormat::Quiet => println!("{}", library.id),
        }
    }

    /// Print library settings
    pub fn print_settings(&self, settings: &LibrarySettings) {
        match self.format {
            OutputFormat::Human => {
                println!("── Settings ──");
                println!("show_ddc:      {}", settings.show_ddc);
                println!("show_subjects: {}", settings.show_fast_subjects);
                println!("show_tags:     {}", settings.show_tags);
                println!("show_preview:  {}", settings.show_preview);
                println!("sort_by:       {}", settings.sort_by.short_name());
            }
            OutputFormat::Json => print_json(settings),
            OutputFormat::Quiet => println!("{}", settings.sort_by.short_name()),
        }
    }

    /// Print books, showing the optional columns the library settings enable
    pub fn print_books(&self, books: &[&Book], settings: &LibrarySettings) {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("No books found.");
                    return;
                }
                for book in books {
                    let mut line = format!(
                        "{} | {} | {}",
                        &book.id.to_string()[..8],
                        truncate(&book.title, 35),
                        truncate(&book.author, 25)
                    );
                    if settings.show_ddc {
                        line.push_str(&format!(" | {}", book.ddc.as_deref().unwrap_or("-")));
                    }
                    if settings.show_tags && !book.tags.is_empty() {
                        line.push_str(&format!(" [{}]", book.tags.join(", ")));
                    }
                    println!("{}", line);
                    if settings.show_fast_subjects && !book.subjects.is_empty() {
                        println!("    {}", truncate(&book.subjects.join("; "), 70));
                    }
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => print_json(&books),
            OutputFormat::Quiet => {
                for book in books {
                    println!("{}", book.id);
                }
            }
        }
    }

    /// Print a single book
    pub fn print_book(&self, book: &Book) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", book.id);
                println!("Title:    {}", book.title);
                println!("Author:   {}", book.author);
                println!("ISBN:     {}", book.isbn);
                if let Some(ref ddc) = book.ddc {
                    println!("DDC:      {}", ddc);
                }
                if !book.subjects.is_empty() {
                    println!("Subjects: {}", book.subjects.join("; "));
                }
                if !book.tags.is_empty() {
                    println!("Tags:     {}", book.tags.join(", "));
                }
                if let Some(ref image) = book.image {
                    println!("Cover:    {}", image);
                }
            }
            OutputFormat::Json => print_json(book),
            OutputFormat::Quiet => println!("{}", book.id),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
