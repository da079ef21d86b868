//! Seed the catalog from a JSON file.
//!
//! The file holds an array of book objects in the same shape the
//! `POST /api/books` endpoint accepts:
//!
//! ```json
//! [
//!   { "title": "Things Fall Apart", "author": "Chinua Achebe",
//!     "ISBN": "978-0385474542", "price": "19.99", "stock": 12 }
//! ]
//! ```
//!
//! Every entry is validated before anything is written. Entries whose ISBN
//! already exists are skipped.

use std::path::Path;

use bookstore_server::config::CacheConfig;
use bookstore_server::db::Stores;
use bookstore_server::services::{BookInput, CatalogCache, CatalogError, CatalogService};
use tracing::{error, info, warn};

use super::connect;

/// Seed books from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry fails
/// validation, or the database is unreachable.
pub async fn books(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading books from file");

    let content = tokio::fs::read_to_string(path).await?;
    let inputs: Vec<BookInput> = serde_json::from_str(&content)?;

    info!(books = inputs.len(), "Parsed file");

    // Validate everything before connecting to the database
    let errors: Vec<String> = inputs
        .iter()
        .enumerate()
        .filter_map(|(i, input)| {
            input
                .clone()
                .validate()
                .err()
                .map(|e| format!("entry {i}: {e}"))
        })
        .collect();
    if !errors.is_empty() {
        error!("Validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = connect().await?;
    let stores = Stores::postgres(pool);
    let catalog = CatalogService::new(stores.books, CatalogCache::new(&CacheConfig::default()));

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;
    for input in inputs {
        match catalog.create(input).await {
            Ok(book) => {
                inserted += 1;
                info!(book_id = %book.id, title = %book.title, "inserted");
            }
            Err(CatalogError::DuplicateIsbn(isbn)) => {
                skipped += 1;
                warn!(%isbn, "skipped, ISBN already exists");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Seeding complete!");
    info!("  Books inserted: {inserted}");
    info!("  Books skipped (already exist): {skipped}");
    Ok(())
}
