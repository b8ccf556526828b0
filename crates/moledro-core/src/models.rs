//! Data models for Moledro
//!
//! Defines the core data structures: Library, Book, LibrarySettings and the
//! transient BookInfo returned by ISBN lookups.
//!
//! These are plain in-memory values. Mapping to and from the loosely-typed
//! documents kept by the document store lives in `document`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base URL for Bookscouter price comparisons
const BOOKSCOUTER_URL: &str = "https://bookscouter.com/bulk-comparison";

/// A physical book in a library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    /// Unique identifier, assigned once at creation
    pub id: Uuid,
    /// ISBN (or other scanned code) used for the lookup
    pub isbn: String,
    pub title: String,
    pub author: String,
    /// User that created the record
    pub owner_uid: String,
    /// Cover image URL
    pub image: Option<String>,
    /// Dewey decimal classification
    pub ddc: Option<String>,
    /// FAST subject headings
    pub subjects: Vec<String>,
    /// User-editable tags
    pub tags: Vec<String>,
}

impl Book {
    /// Create a new book from a lookup result
    ///
    /// Assigns a fresh id, copies the lookup fields and starts with no tags.
    pub fn from_info(info: BookInfo, owner_uid: impl Into<String>) -> Self {
        let (ddc, subjects) = match info.classification {
            Some(classification) => (classification.ddc, classification.subjects),
            None => (None, Vec::new()),
        };

        Self {
            id: Uuid::new_v4(),
            isbn: info.isbn,
            title: info.title,
            author: info.author,
            owner_uid: owner_uid.into(),
            image: info.image,
            ddc,
            subjects,
            tags: Vec::new(),
        }
    }

    /// Add a tag
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Remove a tag
    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    /// Case-insensitive title match, an empty query matches everything
    pub fn title_matches(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty() || self.title.to_lowercase().contains(&query.to_lowercase())
    }

    /// Bookscouter price comparison URL for this book
    pub fn bookscouter_url(&self) -> String {
        format!("{}?isbn={}", BOOKSCOUTER_URL, self.isbn)
    }
}

/// Dewey classification and subject headings for a work
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub ddc: Option<String>,
    pub subjects: Vec<String>,
}

/// Book details returned by an ISBN lookup
///
/// Carries no identity or ownership; it is the seed for a `Book`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookInfo {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub image: Option<String>,
    pub classification: Option<Classification>,
}

impl From<&Book> for BookInfo {
    fn from(book: &Book) -> Self {
        let classification = if book.ddc.is_none() && book.subjects.is_empty() {
            None
        } else {
            Some(Classification {
                ddc: book.ddc.clone(),
                subjects: book.subjects.clone(),
            })
        };

        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            image: book.image.clone(),
            classification,
        }
    }
}

/// Sort order for a library's books
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SortBy {
    #[default]
    AlphaByAuthor,
    AlphaByTitle,
    DdcThenAlphaByAuthor,
    DdcThenAlphaByTitle,
}

impl SortBy {
    pub const ALL: [SortBy; 4] = [
        SortBy::AlphaByAuthor,
        SortBy::AlphaByTitle,
        SortBy::DdcThenAlphaByAuthor,
        SortBy::DdcThenAlphaByTitle,
    ];

    /// Value stored in library documents
    ///
    /// The `DCC_` spelling is what existing documents carry.
    pub fn as_wire(&self) -> &'static str {
        match self {
            SortBy::AlphaByAuthor => "ALPHA_BY_AUTHOR",
            SortBy::AlphaByTitle => "ALPHA_BY_TITLE",
            SortBy::DdcThenAlphaByAuthor => "DCC_THEN_ALPHA_BY_AUTHOR",
            SortBy::DdcThenAlphaByTitle => "DCC_THEN_ALPHA_BY_TITLE",
        }
    }

    /// Parse a stored value, `None` for anything unrecognized
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_wire() == value)
    }

    /// Short name used on the command line
    pub fn short_name(&self) -> &'static str {
        match self {
            SortBy::AlphaByAuthor => "author",
            SortBy::AlphaByTitle => "title",
            SortBy::DdcThenAlphaByAuthor => "ddc-author",
            SortBy::DdcThenAlphaByTitle => "ddc-title",
        }
    }

    fn uses_ddc(&self) -> bool {
        matches!(
            self,
            SortBy::DdcThenAlphaByAuthor | SortBy::DdcThenAlphaByTitle
        )
    }

    fn compare_alpha(&self, a: &Book, b: &Book) -> Ordering {
        let by_author = || cmp_ignore_case(&a.author, &b.author);
        let by_title = || cmp_ignore_case(&a.title, &b.title);
        match self {
            SortBy::AlphaByAuthor | SortBy::DdcThenAlphaByAuthor => {
                by_author().then_with(by_title)
            }
            SortBy::AlphaByTitle | SortBy::DdcThenAlphaByTitle => by_title().then_with(by_author),
        }
    }

    /// Compare two books under this ordering
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        if self.uses_ddc() {
            let ddc_order = match (&a.ddc, &b.ddc) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ddc_order != Ordering::Equal {
                return ddc_order;
            }
        }
        self.compare_alpha(a, b)
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s)
            .or_else(|| Self::ALL.into_iter().find(|v| v.short_name() == s))
            .ok_or_else(|| {
                format!(
                    "Unknown sort order '{}'. Valid values: author, title, ddc-author, ddc-title",
                    s
                )
            })
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Per-library display and ordering settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibrarySettings {
    pub show_ddc: bool,
    pub show_fast_subjects: bool,
    pub show_tags: bool,
    pub show_preview: bool,
    pub sort_by: SortBy,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            show_ddc: false,
            show_fast_subjects: false,
            show_tags: true,
            show_preview: true,
            sort_by: SortBy::AlphaByAuthor,
        }
    }
}

/// A named collection of books owned by one user
///
/// The whole value is persisted as a single document; `books` keeps
/// insertion order and may hold the same book more than once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Library {
    /// Store-assigned document id
    pub id: String,
    pub name: String,
    pub owner_uid: String,
    pub settings: LibrarySettings,
    pub books: Vec<Book>,
}

impl Library {
    /// Create an empty library with default settings
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_uid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_uid: owner_uid.into(),
            settings: LibrarySettings::default(),
            books: Vec::new(),
        }
    }

    /// Find the first book with the given id
    pub fn book(&self, id: Uuid) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Books ordered by the library's `sort_by` setting
    ///
    /// Sorting is stable, so equal books keep their insertion order.
    pub fn sorted_books(&self) -> Vec<&Book> {
        let mut books: Vec<&Book> = self.books.iter().collect();
        let sort_by = self.settings.sort_by;
        books.sort_by(|a, b| sort_by.compare(a, b));
        books
    }

    /// Books whose title contains `query` (case-insensitive), in insertion order
    pub fn search_books(&self, query: &str) -> Vec<&Book> {
        self.books.iter().filter(|b| b.title_matches(query)).collect()
    }
}

/// Short description of a library for list views
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LibrarySummary {
    pub id: String,
    pub name: String,
    pub owner_uid: String,
    pub book_count: usize,
}

impl From<&Library> for LibrarySummary {
    fn from(library: &Library) -> Self {
        Self {
            id: library.id.clone(),
            name: library.name.clone(),
            owner_uid: library.owner_uid.clone(),
            book_count: library.books.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, author: &str, ddc: Option<&str>) -> Book {
        Book::from_info(
            BookInfo {
                title: title.to_string(),
                author: author.to_string(),
                isbn: "9780000000000".to_string(),
                image: None,
                classification: ddc.map(|d| Classification {
                    ddc: Some(d.to_string()),
                    subjects: Vec::new(),
                }),
            },
            "owner",
        )
    }

    fn titles(books: &[&Book]) -> Vec<String> {
        books.iter().map(|b| b.title.clone()).collect()
    }

    #[test]
    fn test_book_from_info() {
        let info = BookInfo {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "9780441013593".to_string(),
            image: Some("https://example.com/dune.jpg".to_string()),
            classification: Some(Classification {
                ddc: Some("813.54".to_string()),
                subjects: vec!["Science fiction".to_string()],
            }),
        };

        let book = Book::from_info(info, "user-1");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.owner_uid, "user-1");
        assert_eq!(book.ddc.as_deref(), Some("813.54"));
        assert_eq!(book.subjects, vec!["Science fiction"]);
        assert!(book.tags.is_empty());
    }

    #[test]
    fn test_book_from_info_assigns_fresh_ids() {
        let a = book("Same", "Author", None);
        let b = book("Same", "Author", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_book_info_projection() {
        let mut b = book("Dune", "Frank Herbert", Some("813.54"));
        b.add_tag("favorite");

        let info = BookInfo::from(&b);
        assert_eq!(info.title, "Dune");
        assert_eq!(info.isbn, b.isbn);
        assert_eq!(
            info.classification.and_then(|c| c.ddc).as_deref(),
            Some("813.54")
        );

        let plain = book("Plain", "Nobody", None);
        assert!(BookInfo::from(&plain).classification.is_none());
    }

    #[test]
    fn test_book_tags() {
        let mut b = book("Dune", "Frank Herbert", None);
        b.add_tag("sci-fi");
        b.add_tag("classic");
        b.add_tag("sci-fi");
        assert_eq!(b.tags, vec!["sci-fi", "classic"]);

        b.remove_tag("sci-fi");
        assert_eq!(b.tags, vec!["classic"]);
    }

    #[test]
    fn test_bookscouter_url() {
        let b = book("Dune", "Frank Herbert", None);
        assert_eq!(
            b.bookscouter_url(),
            "https://bookscouter.com/bulk-comparison?isbn=9780000000000"
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = LibrarySettings::default();
        assert!(!settings.show_ddc);
        assert!(!settings.show_fast_subjects);
        assert!(settings.show_tags);
        assert!(settings.show_preview);
        assert_eq!(settings.sort_by, SortBy::AlphaByAuthor);
    }

    #[test]
    fn test_sort_by_wire_names() {
        for sort_by in SortBy::ALL {
            assert_eq!(SortBy::from_wire(sort_by.as_wire()), Some(sort_by));
        }
        assert_eq!(SortBy::from_wire("bogus"), None);
        assert_eq!(
            SortBy::from_wire("DCC_THEN_ALPHA_BY_TITLE"),
            Some(SortBy::DdcThenAlphaByTitle)
        );
    }

    #[test]
    fn test_sort_by_from_str() {
        assert_eq!("title".parse::<SortBy>().unwrap(), SortBy::AlphaByTitle);
        assert_eq!(
            "ddc-author".parse::<SortBy>().unwrap(),
            SortBy::DdcThenAlphaByAuthor
        );
        assert_eq!(
            "ALPHA_BY_AUTHOR".parse::<SortBy>().unwrap(),
            SortBy::AlphaByAuthor
        );
        assert!("sideways".parse::<SortBy>().is_err());
    }

    #[test]
    fn test_sorted_books_by_author_and_title() {
        let mut library = Library::new("lib", "Shelf", "owner");
        library.books.push(book("Neuromancer", "William Gibson", None));
        library.books.push(book("Dune", "Frank Herbert", None));
        library.books.push(book("Children of Dune", "frank herbert", None));

        assert_eq!(
            titles(&library.sorted_books()),
            vec!["Children of Dune", "Dune", "Neuromancer"]
        );

        library.settings.sort_by = SortBy::AlphaByTitle;
        assert_eq!(
            titles(&library.sorted_books()),
            vec!["Children of Dune", "Dune", "Neuromancer"]
        );

        // Sorting never reorders the stored list
        assert_eq!(library.books[0].title, "Neuromancer");
    }

    #[test]
    fn test_sorted_books_ddc_first() {
        let mut library = Library::new("lib", "Shelf", "owner");
        library.books.push(book("Zoology", "Adams", None));
        library.books.push(book("History", "Brown", Some("900")));
        library.books.push(book("Fiction", "Clark", Some("813")));
        library.books.push(book("Atlas", "Zed", None));
        library.settings.sort_by = SortBy::DdcThenAlphaByTitle;

        assert_eq!(
            titles(&library.sorted_books()),
            vec!["Fiction", "History", "Atlas", "Zoology"]
        );

        library.settings.sort_by = SortBy::DdcThenAlphaByAuthor;
        assert_eq!(
            titles(&library.sorted_books()),
            vec!["Fiction", "History", "Zoology", "Atlas"]
        );
    }

    #[test]
    fn test_search_books() {
        let mut library = Library::new("lib", "Shelf", "owner");
        library.books.push(book("Dune", "Frank Herbert", None));
        library.books.push(book("Dune Messiah", "Frank Herbert", None));
        library.books.push(book("Neuromancer", "William Gibson", None));

        assert_eq!(
            titles(&library.search_books("dUNe")),
            vec!["Dune", "Dune Messiah"]
        );
        assert_eq!(library.search_books("").len(), 3);
        assert!(library.search_books("missing").is_empty());
    }

    #[test]
    fn test_library_summary() {
        let mut library = Library::new("lib-1", "Shelf", "owner");
        library.books.push(book("Dune", "Frank Herbert", None));

        let summary = LibrarySummary::from(&library);
        assert_eq!(summary.id, "lib-1");
        assert_eq!(summary.book_count, 1);
    }

    #[test]
    fn test_library_serialization() {
        let mut library = Library::new("lib-1", "Shelf", "owner");
        library.books.push(book("Dune", "Frank Herbert", Some("813")));
        let json = serde_json::to_string(&library).unwrap();
        let deserialized: Library = serde_json::from_str(&json).unwrap();
        assert_eq!(library, deserialized);
    }
}
