//! Dashboard figures for catalog administrators.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{BookRepository, RepositoryError, UserRepository};

/// Store-wide totals shown on the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_books: i64,
}

#[derive(Clone)]
pub struct AdminService {
    books: Arc<dyn BookRepository>,
    users: Arc<dyn UserRepository>,
}

impl AdminService {
    #[must_use]
    pub fn new(books: Arc<dyn BookRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { books, users }
    }

    /// Count accounts and books. Not cached.
    ///
    /// # Errors
    ///
    /// Returns a repository error if either count fails.
    pub async fn stats(&self) -> Result<AdminStats, RepositoryError> {
        let (total_users, total_books) = tokio::try_join!(self.users.count(), self.books.count())?;
        Ok(AdminStats {
            total_users,
            total_books,
        })
    }
}

#[cfg(test)]
mod tests {
    use bookstore_core::{Email, Isbn, UserRole};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::NewBook;

    #[tokio::test]
    async fn test_stats_count_users_and_books() {
        let store = InMemoryStore::new();
        let service = AdminService::new(Arc::new(store.clone()), Arc::new(store.clone()));
        assert_eq!(
            service.stats().await.unwrap(),
            AdminStats {
                total_users: 0,
                total_books: 0
            }
        );

        let email = Email::parse("ada@example.com").unwrap();
        UserRepository::create(&store, "Ada", &email, "hash", UserRole::User)
            .await
            .unwrap();
        for (title, isbn) in [("A", "978-0000000001"), ("B", "978-0000000002")] {
            let book = NewBook {
                title: title.to_owned(),
                author: "Chinua Achebe".to_owned(),
                published_date: NaiveDate::from_ymd_opt(1958, 6, 17).unwrap(),
                isbn: Isbn::parse(isbn).unwrap(),
                price: Decimal::new(1299, 2),
                stock: 1,
                description: None,
            };
            BookRepository::create(&store, &book).await.unwrap();
        }

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_books, 2);
    }
}
