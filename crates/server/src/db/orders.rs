//! Order repository backed by `PostgreSQL`.
//!
//! Payment transitions are conditional updates on `payment_status`, so the
//! database decides which of several concurrent callers wins.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bookstore_core::{BookId, OrderId, PaymentMethod, PaymentStatus, UserId};

use super::{OrderRepository, RepositoryError};
use crate::models::{LineItem, NewOrder, Order};

const ORDER_COLUMNS: &str = "id, user_id, total_price, payment_method, payment_status, \
                             provider_reference, inventory_released, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    total_price: Decimal,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    provider_reference: Option<String>,
    inventory_released: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Order {
        Order {
            id: OrderId::new(self.id),
            user_id: UserId::new(self.user_id),
            items,
            total_price: self.total_price,
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            provider_reference: self.provider_reference,
            inventory_released: self.inventory_released,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    order_id: i32,
    book_id: i32,
    quantity: i32,
}

/// Repository for order database operations.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lines_for(&self, ids: &[i32]) -> Result<HashMap<i32, Vec<LineItem>>, sqlx::Error> {
        let rows: Vec<LineRow> = sqlx::query_as(
            r"
            SELECT order_id, book_id, quantity
            FROM bookstore.order_line
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<i32, Vec<LineItem>> = HashMap::new();
        for row in rows {
            by_order
                .entry(row.order_id)
                .or_default()
                .push(LineItem::new(BookId::new(row.book_id), row.quantity));
        }
        Ok(by_order)
    }

    async fn hydrate(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.lines_for(&[row.id]).await?;
        let items = lines.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_order(items)))
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO bookstore.customer_order (user_id, total_price, payment_method)
             VALUES ($1, $2, $3)
             RETURNING {ORDER_COLUMNS}"
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(order.user_id)
            .bind(order.total_price)
            .bind(order.payment_method)
            .fetch_one(&mut *tx)
            .await?;

        let positions: Vec<i32> = (0..).take(order.items.len()).collect();
        let book_ids: Vec<i32> = order.items.iter().map(|i| i.book_id.as_i32()).collect();
        let quantities: Vec<i32> = order.items.iter().map(|i| i.quantity).collect();
        sqlx::query(
            r"
            INSERT INTO bookstore.order_line (order_id, position, book_id, quantity)
            SELECT $1, * FROM UNNEST($2::int4[], $3::int4[], $4::int4[])
            ",
        )
        .bind(row.id)
        .bind(&positions)
        .bind(&book_ids)
        .bind(&quantities)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_order(order.items.clone()))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM bookstore.customer_order WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM bookstore.customer_order
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.lines_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let items = lines.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect())
    }

    async fn attach_payment_intent(
        &self,
        id: OrderId,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE bookstore.customer_order
             SET payment_method = $2, provider_reference = $3,
                 payment_status = 'awaiting_payment', updated_at = now()
             WHERE id = $1 AND payment_status IN ('pending', 'awaiting_payment')
             RETURNING {ORDER_COLUMNS}"
        );
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(method)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn settle(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        if !status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "cannot settle an order as {}",
                status.as_str()
            )));
        }
        let sql = format!(
            "UPDATE bookstore.customer_order
             SET payment_status = $2, updated_at = now()
             WHERE id = $1
               AND payment_status IN ('pending', 'awaiting_payment')
               AND provider_reference IS NOT DISTINCT FROM $3
             RETURNING {ORDER_COLUMNS}"
        );
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(status)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn claim_inventory_release(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE bookstore.customer_order
            SET inventory_released = true, updated_at = now()
            WHERE id = $1 AND payment_status = 'failed' AND NOT inventory_released
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revert_inventory_release(&self, id: OrderId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE bookstore.customer_order
            SET inventory_released = false, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
