//! Catalog domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bookstore_core::{BookId, Isbn};

/// A catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    #[serde(rename = "ISBN")]
    pub isbn: Isbn,
    /// Unit price in the store currency.
    pub price: Decimal,
    /// Copies available for reservation. Never negative.
    pub stock: i32,
    pub description: Option<String>,
    /// Reference (URL) of an uploaded cover image.
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated fields for creating or fully replacing a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_date: NaiveDate,
    pub isbn: Isbn,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
}

/// Field a listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Title,
    Author,
    Price,
    PublishedDate,
}

impl SortField {
    /// Column name in the `bookstore.book` table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
            Self::Price => "price",
            Self::PublishedDate => "published_date",
        }
    }

    /// Parse a query-string field name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "author" => Some(Self::Author),
            "price" => Some(Self::Price),
            "publishedDate" | "published_date" => Some(Self::PublishedDate),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Normalized catalog listing query.
///
/// Also serves as the listing cache key, so two requests that differ only in
/// parameter spelling share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookQuery {
    /// Case-insensitive author substring.
    pub author: Option<String>,
    /// Case-insensitive title substring.
    pub title: Option<String>,
    /// Inclusive lower bound on the published date.
    pub published_from: Option<NaiveDate>,
    /// Inclusive upper bound on the published date.
    pub published_to: Option<NaiveDate>,
    pub sort: Vec<(SortField, SortDirection)>,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl BookQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest page size a caller may request.
    pub const MAX_LIMIT: u32 = 100;

    /// Number of rows to skip for the current page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            author: None,
            title: None,
            published_from: None,
            published_to: None,
            sort: Vec::new(),
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}
