//! The Book entity and its identifier.

use super::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique book identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookId(pub Uuid);

impl BookId {
    /// Wrap an existing UUID.
    pub fn new(id: Uuid) -> Self {
        BookId(id)
    }

    /// Generate a fresh random (v4) identifier.
    pub fn generate() -> Self {
        BookId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(BookId)
    }
}

/// A book as stored in the `books` table.
///
/// `id` stays `None` until the book has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Store-assigned identifier.
    pub id: Option<BookId>,
    /// Title of the book.
    pub title: String,
    /// Author of the book.
    pub author: String,
    /// Price; non-negative by convention, enforced by the schema.
    pub price: Decimal,
}

impl Book {
    /// Create an unpersisted book.
    pub fn new(title: impl Into<String>, author: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
            price,
        }
    }

    /// Copy of this book carrying the given identifier.
    pub fn with_id(&self, id: BookId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some_and(|id| !id.is_nil())
    }
}
