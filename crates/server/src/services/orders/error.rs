//! Order and payment error types.

use thiserror::Error;

use bookstore_core::{BookId, OrderId};

use crate::db::{RepositoryError, ReservationError};
use crate::payments::GatewayError;

/// Errors returned by the order/payment orchestrator.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed or inconsistent input. Not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A book has fewer copies than requested. Nothing was reserved.
    #[error("insufficient stock for book {book_id} (requested {requested})")]
    InsufficientStock { book_id: BookId, requested: i32 },

    /// A line item names a book that does not exist.
    #[error("book {0} not found")]
    BookNotFound(BookId),

    /// The order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The order belongs to someone else.
    #[error("order {0} belongs to another user")]
    Forbidden(OrderId),

    /// The provider could not be reached or answered with a transient error.
    /// The order is unchanged; verification can be retried.
    #[error("payment provider unavailable: {0}")]
    GatewayUnavailable(String),

    /// The provider refused the payment. The order is `Failed`.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// The reference does not belong to the order, or the provider does not
    /// know it.
    #[error("invalid payment reference: {0}")]
    InvalidReference(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<ReservationError> for OrderError {
    fn from(e: ReservationError) -> Self {
        match e {
            ReservationError::InsufficientStock { book_id, requested } => {
                Self::InsufficientStock { book_id, requested }
            }
            ReservationError::UnknownBook(id) => Self::BookNotFound(id),
            ReservationError::Repository(e) => Self::Repository(e),
        }
    }
}

impl From<GatewayError> for OrderError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(m) => Self::GatewayUnavailable(m),
            GatewayError::Declined(m) => Self::PaymentDeclined(m),
            GatewayError::InvalidReference(m) => Self::InvalidReference(m),
        }
    }
}
