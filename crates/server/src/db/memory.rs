//! In-memory implementation of every repository trait.
//!
//! All tables live behind one `RwLock`, so each operation is atomic with
//! respect to every other: a reservation checks and decrements all lines
//! under the same write guard, and order transitions compare-and-set the
//! status the same way the SQL `WHERE payment_status IN (...)` does.
//!
//! Not durable. Used by tests and by `bookstore-server` when no database URL
//! is configured.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use bookstore_core::{BookId, Email, OrderId, PaymentMethod, PaymentStatus, UserId, UserRole};

use super::{
    BookRepository, InventoryLedger, OrderRepository, RepositoryError, ReservationError,
    UserRepository,
};
use crate::models::{
    Book, BookQuery, LineItem, NewBook, NewOrder, Order, SortDirection, SortField, User,
};

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    password_hash: String,
    reset_token: Option<(String, DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct Tables {
    books: BTreeMap<BookId, Book>,
    users: BTreeMap<UserId, UserRecord>,
    orders: BTreeMap<OrderId, Order>,
    next_book_id: i32,
    next_user_id: i32,
    next_order_id: i32,
}

impl Tables {
    fn isbn_taken(&self, book: &NewBook, except: Option<BookId>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == book.isbn && Some(b.id) != except)
    }
}

/// Process-local store. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stock of a book, if it exists.
    pub async fn stock_of(&self, id: BookId) -> Option<i32> {
        self.tables.read().await.books.get(&id).map(|b| b.stock)
    }
}

fn compare(a: &Book, b: &Book, field: SortField) -> Ordering {
    match field {
        SortField::Title => a.title.cmp(&b.title),
        SortField::Author => a.author.cmp(&b.author),
        SortField::Price => a.price.cmp(&b.price),
        SortField::PublishedDate => a.published_date.cmp(&b.published_date),
    }
}

fn matches_query(book: &Book, query: &BookQuery) -> bool {
    let contains = |haystack: &str, needle: &Option<String>| {
        needle
            .as_ref()
            .is_none_or(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
    };
    contains(&book.author, &query.author)
        && contains(&book.title, &query.title)
        && query.published_from.is_none_or(|d| book.published_date >= d)
        && query.published_to.is_none_or(|d| book.published_date <= d)
}

#[async_trait]
impl BookRepository for InMemoryStore {
    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.isbn_taken(book, None) {
            return Err(RepositoryError::Conflict("isbn already exists".to_owned()));
        }
        tables.next_book_id += 1;
        let id = BookId::new(tables.next_book_id);
        let now = Utc::now();
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            published_date: book.published_date,
            isbn: book.isbn.clone(),
            price: book.price,
            stock: book.stock,
            description: book.description.clone(),
            cover_image: None,
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: BookId, book: &NewBook) -> Result<Book, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.books.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if tables.isbn_taken(book, Some(id)) {
            return Err(RepositoryError::Conflict("isbn already exists".to_owned()));
        }
        let existing = tables.books.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        existing.title.clone_from(&book.title);
        existing.author.clone_from(&book.author);
        existing.published_date = book.published_date;
        existing.isbn = book.isbn.clone();
        existing.price = book.price;
        existing.stock = book.stock;
        existing.description.clone_from(&book.description);
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn set_cover_image(&self, id: BookId, url: &str) -> Result<Book, RepositoryError> {
        let mut tables = self.tables.write().await;
        let book = tables.books.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        book.cover_image = Some(url.to_owned());
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete(&self, id: BookId) -> Result<Book, RepositoryError> {
        self.tables
            .write()
            .await
            .books
            .remove(&id)
            .ok_or(RepositoryError::NotFound)
    }

    async fn get(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        Ok(self.tables.read().await.books.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[BookId]) -> Result<Vec<Book>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.books.get(id).cloned())
            .collect())
    }

    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|b| matches_query(b, query))
            .cloned()
            .collect();

        books.sort_by(|a, b| {
            query
                .sort
                .iter()
                .map(|(field, direction)| match direction {
                    SortDirection::Asc => compare(a, b, *field),
                    SortDirection::Desc => compare(b, a, *field),
                })
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(books.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let len = self.tables.read().await.books.len();
        Ok(i64::try_from(len).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn reserve(&self, items: &[LineItem]) -> Result<(), ReservationError> {
        let lines = LineItem::consolidate(items);
        let mut tables = self.tables.write().await;

        for line in &lines {
            let book = tables
                .books
                .get(&line.book_id)
                .ok_or(ReservationError::UnknownBook(line.book_id))?;
            if book.stock < line.quantity {
                return Err(ReservationError::InsufficientStock {
                    book_id: line.book_id,
                    requested: line.quantity,
                });
            }
        }

        let now = Utc::now();
        for line in &lines {
            if let Some(book) = tables.books.get_mut(&line.book_id) {
                book.stock -= line.quantity;
                book.updated_at = now;
            }
        }
        Ok(())
    }

    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
        let lines = LineItem::consolidate(items);
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        for line in &lines {
            if let Some(book) = tables.books.get_mut(&line.book_id) {
                book.stock = book.stock.saturating_add(line.quantity);
                book.updated_at = now;
            } else {
                warn!(book_id = %line.book_id, "released stock for a book that no longer exists");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.next_order_id += 1;
        let id = OrderId::new(tables.next_order_id);
        let now = Utc::now();
        let created = Order {
            id,
            user_id: order.user_id,
            items: order.items.clone(),
            total_price: order.total_price,
            payment_method: order.payment_method,
            payment_status: PaymentStatus::Pending,
            provider_reference: None,
            inventory_released: false,
            created_at: now,
            updated_at: now,
        };
        tables.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn attach_payment_intent(
        &self,
        id: OrderId,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.is_terminal() {
            return Ok(None);
        }
        order.payment_method = method;
        order.provider_reference = Some(reference.to_owned());
        order.payment_status = PaymentStatus::AwaitingPayment;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
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
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };
        if !order.payment_status.can_transition_to(status)
            || order.provider_reference.as_deref() != reference
        {
            return Ok(None);
        }
        order.payment_status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn claim_inventory_release(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(false);
        };
        if !order.needs_inventory_release() {
            return Ok(false);
        }
        order.inventory_released = true;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn revert_inventory_release(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(order) = tables.orders.get_mut(&id) {
            order.inventory_released = false;
            order.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|r| &r.user.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.next_user_id),
            name: name.to_owned(),
            email: email.clone(),
            role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: password_hash.to_owned(),
                reset_token: None,
            },
        );
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .get(&id)
            .map(|r| r.user.clone()))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let len = self.tables.read().await.users.len();
        Ok(i64::try_from(len).unwrap_or(i64::MAX))
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|r| &r.user.email == email)
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn set_reset_token(
        &self,
        id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.reset_token = Some((token_hash.to_owned(), expires_at));
        record.user.updated_at = Utc::now();
        Ok(())
    }

    async fn get_reset_token(
        &self,
        id: UserId,
    ) -> Result<Option<(String, DateTime<Utc>)>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).and_then(|r| r.reset_token.clone()))
    }

    async fn complete_password_reset(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(&mut record.password_hash);
        record.reset_token = None;
        record.user.updated_at = Utc::now();
        Ok(())
    }
}
