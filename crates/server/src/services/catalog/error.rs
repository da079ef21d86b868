//! Catalog error types.

use thiserror::Error;

use bookstore_core::BookId;

use crate::db::RepositoryError;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed book fields or listing parameters.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Book not found.
    #[error("book {0} not found")]
    NotFound(BookId),

    /// Another book already uses this ISBN.
    #[error("a book with ISBN {0} already exists")]
    DuplicateIsbn(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
