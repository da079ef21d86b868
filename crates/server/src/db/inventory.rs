//! Inventory ledger backed by `PostgreSQL`.
//!
//! Each decrement is a single conditional `UPDATE ... WHERE stock >= $qty`,
//! so two concurrent checkouts can never both take the last copy. A
//! multi-line reservation runs in one transaction: the first line that
//! cannot be satisfied rolls back every earlier decrement.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

use bookstore_core::BookId;

use super::{InventoryLedger, RepositoryError, ReservationError};
use crate::models::LineItem;

/// Stock ledger over the `bookstore.book.stock` column.
#[derive(Clone)]
pub struct PgInventoryLedger {
    pool: PgPool,
}

impl PgInventoryLedger {
    /// Create a new ledger.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryLedger for PgInventoryLedger {
    async fn reserve(&self, items: &[LineItem]) -> Result<(), ReservationError> {
        // Consolidated lines are sorted by book ID, so concurrent reservations
        // lock rows in the same order and cannot deadlock.
        let lines = LineItem::consolidate(items);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        for line in &lines {
            let reserved: Option<(i32,)> = sqlx::query_as(
                r"
                UPDATE bookstore.book
                SET stock = stock - $2, updated_at = now()
                WHERE id = $1 AND stock >= $2
                RETURNING stock
                ",
            )
            .bind(line.book_id)
            .bind(line.quantity)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            if reserved.is_none() {
                let exists: (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM bookstore.book WHERE id = $1)")
                        .bind(line.book_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(RepositoryError::from)?;
                tx.rollback().await.map_err(RepositoryError::from)?;

                return Err(if exists.0 {
                    ReservationError::InsufficientStock {
                        book_id: line.book_id,
                        requested: line.quantity,
                    }
                } else {
                    ReservationError::UnknownBook(line.book_id)
                });
            }
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(lines = lines.len(), "stock reserved");
        Ok(())
    }

    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
        let lines = LineItem::consolidate(items);
        let mut tx = self.pool.begin().await?;
        let mut missing: Vec<BookId> = Vec::new();

        for line in &lines {
            let result = sqlx::query(
                r"
                UPDATE bookstore.book
                SET stock = stock + $2, updated_at = now()
                WHERE id = $1
                ",
            )
            .bind(line.book_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                missing.push(line.book_id);
            }
        }

        tx.commit().await?;

        if !missing.is_empty() {
            warn!(?missing, "released stock for books that no longer exist");
        }
        Ok(())
    }
}
