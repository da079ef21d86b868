//! Persistence for the bookstore.
//!
//! # Schema: `bookstore`
//!
//! - `book` - Catalog items and their available stock
//! - `app_user` - Accounts, password hashes and reset tokens
//! - `customer_order` / `order_line` - Orders and their line items
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Backends
//!
//! Services depend on the repository traits below. The `Pg*` types back
//! them with `sqlx`; [`memory::InMemoryStore`] implements the same contracts
//! in process for tests and local runs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p bookstore-cli -- migrate
//! ```

pub mod books;
pub mod inventory;
pub mod memory;
pub mod orders;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bookstore_core::{BookId, Email, OrderId, PaymentMethod, PaymentStatus, UserId, UserRole};

use crate::models::{Book, BookQuery, LineItem, NewBook, NewOrder, Order, User};

pub use books::PgBookRepository;
pub use inventory::PgInventoryLedger;
pub use memory::InMemoryStore;
pub use orders::PgOrderRepository;
pub use users::PgUserRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique ISBN or email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Errors from reserving stock.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The book has fewer copies than requested. Nothing was reserved.
    #[error("insufficient stock for book {book_id} (requested {requested})")]
    InsufficientStock { book_id: BookId, requested: i32 },

    /// A line item names a book that does not exist. Nothing was reserved.
    #[error("book {0} not found")]
    UnknownBook(BookId),

    /// The store failed. Nothing was reserved.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Catalog storage.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Insert a book. `Conflict` if the ISBN is taken.
    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError>;

    /// Replace every editable field. `NotFound` or `Conflict` (ISBN).
    async fn update(&self, id: BookId, book: &NewBook) -> Result<Book, RepositoryError>;

    /// Store a cover image reference. `NotFound` if the book is absent.
    async fn set_cover_image(&self, id: BookId, url: &str) -> Result<Book, RepositoryError>;

    /// Delete a book, returning it. `NotFound` if absent.
    async fn delete(&self, id: BookId) -> Result<Book, RepositoryError>;

    async fn get(&self, id: BookId) -> Result<Option<Book>, RepositoryError>;

    /// Fetch the given books; missing IDs are simply absent from the result.
    async fn get_many(&self, ids: &[BookId]) -> Result<Vec<Book>, RepositoryError>;

    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>, RepositoryError>;

    /// Number of books in the catalog.
    async fn count(&self) -> Result<i64, RepositoryError>;
}

/// Available stock per book.
///
/// Reservations are atomic per book (decrement only if enough stock is
/// available) and all-or-nothing per call.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reserve every line or none of them.
    async fn reserve(&self, items: &[LineItem]) -> Result<(), ReservationError>;

    /// Return previously reserved stock.
    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError>;
}

/// Order storage.
///
/// Every mutating method is a conditional write so concurrent callers
/// cannot both win the same transition.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an order in `Pending`.
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// All orders for a user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Record a provider intent and move to `AwaitingPayment`.
    ///
    /// Returns `None` if the order is terminal (or absent).
    async fn attach_payment_intent(
        &self,
        id: OrderId,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Move an open order to `Paid` or `Failed`, provided it still carries
    /// `reference` as its provider reference.
    ///
    /// Returns `None` if the order was already terminal, was re-initiated
    /// with another reference, or is absent. The caller lost the race and
    /// must not apply side effects.
    async fn settle(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Claim the one-time stock release of a failed order.
    ///
    /// Returns `true` for exactly one caller.
    async fn claim_inventory_release(&self, id: OrderId) -> Result<bool, RepositoryError>;

    /// Undo a claim after the release itself failed, so it can be retried.
    async fn revert_inventory_release(&self, id: OrderId) -> Result<(), RepositoryError>;
}

/// Account storage.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. `Conflict` if the email is taken.
    async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Number of registered accounts.
    async fn count(&self) -> Result<i64, RepositoryError>;

    /// User and password hash for login.
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Store a hashed reset token, replacing any previous one.
    async fn set_reset_token(
        &self,
        id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Hashed reset token and its expiry, if one is outstanding.
    async fn get_reset_token(
        &self,
        id: UserId,
    ) -> Result<Option<(String, DateTime<Utc>)>, RepositoryError>;

    /// Replace the password hash and clear the reset token.
    async fn complete_password_reset(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;
}

/// The repository handles the services run on.
#[derive(Clone)]
pub struct Stores {
    pub books: Arc<dyn BookRepository>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pool: Option<PgPool>,
}

impl Stores {
    /// Repositories backed by `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            books: Arc::new(PgBookRepository::new(pool.clone())),
            inventory: Arc::new(PgInventoryLedger::new(pool.clone())),
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repositories sharing one in-process store.
    #[must_use]
    pub fn in_memory(store: &InMemoryStore) -> Self {
        Self {
            books: Arc::new(store.clone()),
            inventory: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            pool: None,
        }
    }

    /// The database pool, when running on `PostgreSQL`.
    #[must_use]
    pub const fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}

/// Map a unique-constraint violation to `Conflict`.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
