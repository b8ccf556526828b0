//! Library document handling
//!
//! This module maps between the schemaless documents kept by the document
//! store and our domain models (Library, Book, LibrarySettings).
//!
//! Decoding is defensive and composed entity by entity:
//! - a book record is all-or-nothing; a bad record is reported as a
//!   `DecodeError` and skipped by the caller
//! - a library record always decodes (missing name/owner become empty,
//!   missing or malformed settings become defaults, bad books are dropped)
//! - settings decode field by field, each falling back to its default
//!
//! Encoding is total and round-trips through `decode_library`.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Book, Library, LibrarySettings, SortBy};

/// A loosely-typed document as held by the store
pub type Document = Map<String, Value>;

/// Errors that can occur while decoding a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field type for {0}")]
    InvalidType(&'static str),

    #[error("Invalid UUID: {0}")]
    InvalidId(String),

    #[error("Document is not an object")]
    NotAnObject,
}

/// Keys used in library documents
pub mod keys {
    pub const NAME: &str = "name";
    pub const OWNER_UID: &str = "ownerUID";
    pub const SETTINGS: &str = "settings";
    pub const BOOKS: &str = "books";

    // Settings fields
    pub const SHOW_DDC: &str = "showDDC";
    pub const SHOW_FAST_SUBJECTS: &str = "showFastSubjects";
    pub const SHOW_TAGS: &str = "showTags";
    pub const SHOW_PREVIEW: &str = "showPreview";
    pub const SORT_BY: &str = "sortBy";

    // Book fields
    pub const ID: &str = "id";
    pub const ISBN: &str = "isbn";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const IMAGE: &str = "image";
    pub const DDC: &str = "ddc";
    pub const SUBJECTS: &str = "subjects";
    pub const TAGS: &str = "tags";
}

// ==================== Decoding ====================

/// Decode a single book record
///
/// Every required field must be present and well-typed. `image` and `ddc`
/// are optional; a missing or null value decodes to `None`.
pub fn decode_book(doc: &Value) -> Result<Book, DecodeError> {
    let doc = doc.as_object().ok_or(DecodeError::NotAnObject)?;

    let id_str = required_str(doc, keys::ID)?;
    let id = Uuid::parse_str(id_str).map_err(|_| DecodeError::InvalidId(id_str.to_string()))?;

    Ok(Book {
        id,
        isbn: required_str(doc, keys::ISBN)?.to_string(),
        title: required_str(doc, keys::TITLE)?.to_string(),
        author: required_str(doc, keys::AUTHOR)?.to_string(),
        owner_uid: required_str(doc, keys::OWNER_UID)?.to_string(),
        image: optional_str(doc, keys::IMAGE)?,
        ddc: optional_str(doc, keys::DDC)?,
        subjects: required_strings(doc, keys::SUBJECTS)?,
        tags: required_strings(doc, keys::TAGS)?,
    })
}

/// Decode library settings, substituting defaults for absent or mistyped keys
///
/// Anything that is not an object yields the default settings.
pub fn decode_settings(doc: &Value) -> LibrarySettings {
    let defaults = LibrarySettings::default();
    let Some(doc) = doc.as_object() else {
        return defaults;
    };

    let flag = |key: &str, default: bool| doc.get(key).and_then(Value::as_bool).unwrap_or(default);

    LibrarySettings {
        show_ddc: flag(keys::SHOW_DDC, defaults.show_ddc),
        show_fast_subjects: flag(keys::SHOW_FAST_SUBJECTS, defaults.show_fast_subjects),
        show_tags: flag(keys::SHOW_TAGS, defaults.show_tags),
        show_preview: flag(keys::SHOW_PREVIEW, defaults.show_preview),
        sort_by: doc
            .get(keys::SORT_BY)
            .and_then(Value::as_str)
            .and_then(SortBy::from_wire)
            .unwrap_or(defaults.sort_by),
    }
}

/// Decode a library document stored under `id`
///
/// Never fails: one bad book record must not lose the rest of the library.
pub fn decode_library(doc: &Document, id: &str) -> Library {
    let text = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let settings = doc
        .get(keys::SETTINGS)
        .map(decode_settings)
        .unwrap_or_default();

    let books = match doc.get(keys::BOOKS).and_then(Value::as_array) {
        Some(records) => records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match decode_book(record) {
                Ok(book) => Some(book),
                Err(e) => {
                    debug!(library_id = id, index, error = %e, "Skipping malformed book record");
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    };

    Library {
        id: id.to_string(),
        name: text(keys::NAME),
        owner_uid: text(keys::OWNER_UID),
        settings,
        books,
    }
}

/// Decode an arbitrary value as a library document
///
/// Fails only when the value is not an object at all.
pub fn decode_library_value(value: &Value, id: &str) -> Result<Library, DecodeError> {
    value
        .as_object()
        .map(|doc| decode_library(doc, id))
        .ok_or(DecodeError::NotAnObject)
}

fn required_str<'a>(doc: &'a Document, key: &'static str) -> Result<&'a str, DecodeError> {
    doc.get(key)
        .ok_or(DecodeError::MissingField(key))?
        .as_str()
        .ok_or(DecodeError::InvalidType(key))
}

fn optional_str(doc: &Document, key: &'static str) -> Result<Option<String>, DecodeError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::InvalidType(key)),
    }
}

fn required_strings(doc: &Document, key: &'static str) -> Result<Vec<String>, DecodeError> {
    doc.get(key)
        .ok_or(DecodeError::MissingField(key))?
        .as_array()
        .ok_or(DecodeError::InvalidType(key))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(DecodeError::InvalidType(key))
        })
        .collect()
}

// ==================== Encoding ====================

/// Encode library settings
pub fn encode_settings(settings: &LibrarySettings) -> Document {
    let mut doc = Document::new();
    doc.insert(keys::SHOW_DDC.into(), settings.show_ddc.into());
    doc.insert(
        keys::SHOW_FAST_SUBJECTS.into(),
        settings.show_fast_subjects.into(),
    );
    doc.insert(keys::SHOW_TAGS.into(), settings.show_tags.into());
    doc.insert(keys::SHOW_PREVIEW.into(), settings.show_preview.into());
    doc.insert(keys::SORT_BY.into(), settings.sort_by.as_wire().into());
    doc
}

/// Encode a single book record
///
/// Absent `image`/`ddc` are omitted rather than written as empty strings.
pub fn encode_book(book: &Book) -> Document {
    let mut doc = Document::new();
    doc.insert(keys::ID.into(), book.id.to_string().into());
    doc.insert(keys::ISBN.into(), book.isbn.clone().into());
    doc.insert(keys::TITLE.into(), book.title.clone().into());
    doc.insert(keys::AUTHOR.into(), book.author.clone().into());
    doc.insert(keys::OWNER_UID.into(), book.owner_uid.clone().into());
    if let Some(ref image) = book.image {
        doc.insert(keys::IMAGE.into(), image.clone().into());
    }
    if let Some(ref ddc) = book.ddc {
        doc.insert(keys::DDC.into(), ddc.clone().into());
    }
    doc.insert(keys::SUBJECTS.into(), book.subjects.clone().into());
    doc.insert(keys::TAGS.into(), book.tags.clone().into());
    doc
}

/// Encode a whole library aggregate
///
/// The library id is the document key and is not part of the body.
pub fn encode_library(library: &Library) -> Document {
    let mut doc = Document::new();
    doc.insert(keys::NAME.into(), library.name.clone().into());
    doc.insert(keys::OWNER_UID.into(), library.owner_uid.clone().into());
    doc.insert(
        keys::SETTINGS.into(),
        Value::Object(encode_settings(&library.settings)),
    );
    doc.insert(
        keys::BOOKS.into(),
        Value::Array(
            library
                .books
                .iter()
                .map(|book| Value::Object(encode_book(book)))
                .collect(),
        ),
    );
    doc
}
