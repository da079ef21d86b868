//! Catalog service.
//!
//! Validates book input, normalizes listing parameters and keeps the
//! [`CatalogCache`] in step with writes.

mod cache;
mod error;

pub use cache::CatalogCache;
pub use error::CatalogError;

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use bookstore_core::{BookId, Isbn};

use crate::db::{BookRepository, RepositoryError};
use crate::models::{Book, BookQuery, NewBook, SortDirection, SortField};

/// Accepted title/author length, in characters.
const NAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=100;

/// Book fields as submitted by an admin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    #[serde(alias = "ISBN")]
    pub isbn: String,
    pub price: Decimal,
    pub stock: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl BookInput {
    /// Validate into a [`NewBook`].
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` naming the first offending field.
    pub fn validate(self) -> Result<NewBook, CatalogError> {
        let title = checked_name("title", &self.title)?;
        let author = checked_name("author", &self.author)?;
        let isbn = Isbn::parse(&self.isbn)
            .map_err(|e| CatalogError::Validation(format!("isbn: {e}")))?;
        if self.price < Decimal::ZERO {
            return Err(CatalogError::Validation(
                "price must not be negative".to_owned(),
            ));
        }
        if self.stock < 0 {
            return Err(CatalogError::Validation(
                "stock must not be negative".to_owned(),
            ));
        }
        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(NewBook {
            title,
            author,
            published_date: self.published_date,
            isbn,
            price: self.price,
            stock: self.stock,
            description,
        })
    }
}

fn checked_name(field: &str, value: &str) -> Result<String, CatalogError> {
    let value = value.trim();
    if !NAME_LENGTH.contains(&value.chars().count()) {
        return Err(CatalogError::Validation(format!(
            "{field} must be between {} and {} characters",
            NAME_LENGTH.start(),
            NAME_LENGTH.end()
        )));
    }
    Ok(value.to_owned())
}

/// Listing parameters as they arrive in the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Comma-separated `field:dir` pairs, e.g. `price:desc,title`.
    pub sort: Option<String>,
}

impl ListParams {
    /// Normalize into a [`BookQuery`].
    ///
    /// A missing or zero page is the first page; a missing or zero limit is
    /// the default and larger limits are capped.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for unknown sort fields or an
    /// inverted date range.
    pub fn into_query(self) -> Result<BookQuery, CatalogError> {
        if let (Some(from), Some(to)) = (self.start_date, self.end_date)
            && from > to
        {
            return Err(CatalogError::Validation(
                "startDate must not be after endDate".to_owned(),
            ));
        }

        let limit = match self.limit {
            None | Some(0) => BookQuery::DEFAULT_LIMIT,
            Some(n) => n.min(BookQuery::MAX_LIMIT),
        };

        Ok(BookQuery {
            author: non_blank(self.author),
            title: non_blank(self.title),
            published_from: self.start_date,
            published_to: self.end_date,
            sort: self.sort.as_deref().map(parse_sort).transpose()?.unwrap_or_default(),
            page: self.page.unwrap_or(1).max(1),
            limit,
        })
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

/// Parse `field:dir,...`. A repeated field keeps its first position and
/// takes the last direction.
fn parse_sort(raw: &str) -> Result<Vec<(SortField, SortDirection)>, CatalogError> {
    let mut sort: Vec<(SortField, SortDirection)> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, dir) = part.split_once(':').unwrap_or((part, "asc"));
        let field = SortField::parse(name.trim())
            .ok_or_else(|| CatalogError::Validation(format!("cannot sort by {name}")))?;
        let direction = if dir.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        match sort.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = direction,
            None => sort.push((field, direction)),
        }
    }
    Ok(sort)
}

/// Catalog reads and admin writes.
#[derive(Clone)]
pub struct CatalogService {
    books: Arc<dyn BookRepository>,
    cache: CatalogCache,
}

impl CatalogService {
    /// Create a new catalog service.
    #[must_use]
    pub fn new(books: Arc<dyn BookRepository>, cache: CatalogCache) -> Self {
        Self { books, cache }
    }

    /// Add a book to the catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for invalid fields and
    /// `CatalogError::DuplicateIsbn` if the ISBN is taken.
    #[instrument(skip(self, input), fields(isbn = %input.isbn))]
    pub async fn create(&self, input: BookInput) -> Result<Book, CatalogError> {
        let book = input.validate()?;
        let created = self
            .books
            .create(&book)
            .await
            .map_err(|e| write_error(e, &book, None))?;
        self.cache.invalidate_book(created.id).await;
        info!(book_id = %created.id, "book created");
        Ok(created)
    }

    /// Replace every editable field of a book.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound`, `CatalogError::Validation` or
    /// `CatalogError::DuplicateIsbn`.
    #[instrument(skip(self, input), fields(book_id = %id))]
    pub async fn update(&self, id: BookId, input: BookInput) -> Result<Book, CatalogError> {
        let book = input.validate()?;
        let updated = self
            .books
            .update(id, &book)
            .await
            .map_err(|e| write_error(e, &book, Some(id)))?;
        self.cache.invalidate_book(id).await;
        info!("book updated");
        Ok(updated)
    }

    /// Point a book at an uploaded cover image.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` unless `url` is an absolute
    /// http(s) URL, and `CatalogError::NotFound` if the book is absent.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn set_cover(&self, id: BookId, url: &str) -> Result<Book, CatalogError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| CatalogError::Validation(format!("cover image URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CatalogError::Validation(
                "cover image URL must use http or https".to_owned(),
            ));
        }
        let updated = self
            .books
            .set_cover_image(id, parsed.as_str())
            .await
            .map_err(|e| not_found(e, id))?;
        self.cache.invalidate_book(id).await;
        info!("cover image updated");
        Ok(updated)
    }

    /// Remove a book from the catalog, returning it.
    ///
    /// Orders that already reference the book keep their line items.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the book is absent.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn delete(&self, id: BookId) -> Result<Book, CatalogError> {
        let deleted = self.books.delete(id).await.map_err(|e| not_found(e, id))?;
        self.cache.invalidate_book(id).await;
        info!("book deleted");
        Ok(deleted)
    }

    /// One book, possibly from cache.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the book is absent.
    pub async fn get(&self, id: BookId) -> Result<Book, CatalogError> {
        if let Some(book) = self.cache.book(id).await {
            debug!(book_id = %id, "book cache hit");
            return Ok(book);
        }
        let book = self.books.get(id).await?.ok_or(CatalogError::NotFound(id))?;
        self.cache.insert_book(&book).await;
        Ok(book)
    }

    /// A filtered, sorted page of books, possibly from cache.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for bad parameters.
    pub async fn list(&self, params: ListParams) -> Result<Arc<Vec<Book>>, CatalogError> {
        let query = params.into_query()?;
        if let Some(books) = self.cache.listing(&query).await {
            debug!(?query, "listing cache hit");
            return Ok(books);
        }
        let books = Arc::new(self.books.list(&query).await?);
        self.cache.insert_listing(query, Arc::clone(&books)).await;
        Ok(books)
    }
}

fn not_found(e: RepositoryError, id: BookId) -> CatalogError {
    match e {
        RepositoryError::NotFound => CatalogError::NotFound(id),
        other => CatalogError::Repository(other),
    }
}

fn write_error(e: RepositoryError, book: &NewBook, id: Option<BookId>) -> CatalogError {
    match (e, id) {
        (RepositoryError::Conflict(_), _) => CatalogError::DuplicateIsbn(book.isbn.to_string()),
        (RepositoryError::NotFound, Some(id)) => CatalogError::NotFound(id),
        (other, _) => CatalogError::Repository(other),
    }
}
