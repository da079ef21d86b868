//! Order aggregate.
//!
//! An order is created by checkout in `Pending` with its stock already
//! reserved, and afterwards changes only through payment transitions. It is
//! never deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, OrderId, PaymentMethod, PaymentStatus, UserId};

/// One book and the number of copies ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub book_id: BookId,
    pub quantity: i32,
}

impl LineItem {
    /// Create a line item.
    #[must_use]
    pub const fn new(book_id: BookId, quantity: i32) -> Self {
        Self { book_id, quantity }
    }

    /// Merge lines that name the same book so each book is reserved once.
    ///
    /// Output is ordered by book ID, which also gives every reservation the
    /// same lock order in the database.
    #[must_use]
    pub fn consolidate(items: &[Self]) -> Vec<Self> {
        let mut merged: BTreeMap<BookId, i32> = BTreeMap::new();
        for item in items {
            let qty = merged.entry(item.book_id).or_insert(0);
            *qty = qty.saturating_add(item.quantity);
        }
        merged
            .into_iter()
            .map(|(book_id, quantity)| Self { book_id, quantity })
            .collect()
    }
}

/// Fields for persisting a freshly reserved order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_price: Decimal,
    pub payment_method: PaymentMethod,
}

/// A purchase intent and its payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_price: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Reference of the latest provider intent, if payment was initiated.
    pub provider_reference: Option<String>,
    /// Set once reserved stock has been returned after a failure.
    #[serde(skip)]
    pub inventory_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the order reached `Paid` or `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.payment_status.is_terminal()
    }

    /// Whether a failed order still holds stock that must be returned.
    #[must_use]
    pub fn needs_inventory_release(&self) -> bool {
        self.payment_status == PaymentStatus::Failed && !self.inventory_released
    }
}
