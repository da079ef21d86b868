//! In-process cache for catalog reads.
//!
//! Single books are keyed by ID; listings by the normalized [`BookQuery`].
//! Entries may be stale until their TTL expires, except that every catalog
//! write through [`super::CatalogService`] drops the affected book and all
//! listings.

use std::sync::Arc;

use moka::future::Cache;

use bookstore_core::BookId;

use crate::config::CacheConfig;
use crate::models::{Book, BookQuery};

/// Catalog read cache.
#[derive(Clone)]
pub struct CatalogCache {
    books: Cache<BookId, Book>,
    listings: Cache<BookQuery, Arc<Vec<Book>>>,
}

impl CatalogCache {
    /// Create a cache with the configured TTL and capacity per kind of entry.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            books: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.ttl)
                .build(),
            listings: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.ttl)
                .build(),
        }
    }

    pub async fn book(&self, id: BookId) -> Option<Book> {
        self.books.get(&id).await
    }

    pub async fn insert_book(&self, book: &Book) {
        self.books.insert(book.id, book.clone()).await;
    }

    pub async fn listing(&self, query: &BookQuery) -> Option<Arc<Vec<Book>>> {
        self.listings.get(query).await
    }

    pub async fn insert_listing(&self, query: BookQuery, books: Arc<Vec<Book>>) {
        self.listings.insert(query, books).await;
    }

    /// Drop one book and every listing that might contain it.
    pub async fn invalidate_book(&self, id: BookId) {
        self.books.invalidate(&id).await;
        self.listings.invalidate_all();
        self.listings.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("books", &self.books.entry_count())
            .field("listings", &self.listings.entry_count())
            .finish()
    }
}
