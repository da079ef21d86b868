//! Catalog repository backed by `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use bookstore_core::{BookId, Isbn};

use super::{BookRepository, RepositoryError, map_unique_violation};
use crate::models::{Book, BookQuery, NewBook, SortDirection};

const BOOK_COLUMNS: &str = "id, title, author, published_date, isbn, price, stock, \
                            description, cover_image, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: i32,
    title: String,
    author: String,
    published_date: NaiveDate,
    isbn: String,
    price: Decimal,
    stock: i32,
    description: Option<String>,
    cover_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookRow> for Book {
    type Error = RepositoryError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let isbn = Isbn::parse(&row.isbn).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid isbn in database: {e}"))
        })?;
        Ok(Self {
            id: BookId::new(row.id),
            title: row.title,
            author: row.author,
            published_date: row.published_date,
            isbn,
            price: row.price,
            stock: row.stock,
            description: row.description,
            cover_image: row.cover_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for catalog database operations.
#[derive(Clone)]
pub struct PgBookRepository {
    pool: PgPool,
}

impl PgBookRepository {
    /// Create a new book repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn create(&self, book: &NewBook) -> Result<Book, RepositoryError> {
        let sql = format!(
            "INSERT INTO bookstore.book
                 (title, author, published_date, isbn, price, stock, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {BOOK_COLUMNS}"
        );
        let row: BookRow = sqlx::query_as(&sql)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_date)
            .bind(book.isbn.as_str())
            .bind(book.price)
            .bind(book.stock)
            .bind(&book.description)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "isbn"))?;
        row.try_into()
    }

    async fn update(&self, id: BookId, book: &NewBook) -> Result<Book, RepositoryError> {
        let sql = format!(
            "UPDATE bookstore.book
             SET title = $2, author = $3, published_date = $4, isbn = $5,
                 price = $6, stock = $7, description = $8, updated_at = now()
             WHERE id = $1
             RETURNING {BOOK_COLUMNS}"
        );
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_date)
            .bind(book.isbn.as_str())
            .bind(book.price)
            .bind(book.stock)
            .bind(&book.description)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "isbn"))?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn set_cover_image(&self, id: BookId, url: &str) -> Result<Book, RepositoryError> {
        let sql = format!(
            "UPDATE bookstore.book SET cover_image = $2, updated_at = now()
             WHERE id = $1
             RETURNING {BOOK_COLUMNS}"
        );
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete(&self, id: BookId) -> Result<Book, RepositoryError> {
        let sql = format!("DELETE FROM bookstore.book WHERE id = $1 RETURNING {BOOK_COLUMNS}");
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn get(&self, id: BookId) -> Result<Option<Book>, RepositoryError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM bookstore.book WHERE id = $1");
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Book::try_from).transpose()
    }

    async fn get_many(&self, ids: &[BookId]) -> Result<Vec<Book>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(BookId::as_i32).collect();
        let sql = format!("SELECT {BOOK_COLUMNS} FROM bookstore.book WHERE id = ANY($1)");
        let rows: Vec<BookRow> = sqlx::query_as(&sql)
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Book::try_from).collect()
    }

    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>, RepositoryError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {BOOK_COLUMNS} FROM bookstore.book WHERE TRUE"));

        if let Some(author) = &query.author {
            qb.push(" AND author ILIKE ")
                .push_bind(format!("%{}%", escape_like(author)));
        }
        if let Some(title) = &query.title {
            qb.push(" AND title ILIKE ")
                .push_bind(format!("%{}%", escape_like(title)));
        }
        if let Some(from) = query.published_from {
            qb.push(" AND published_date >= ").push_bind(from);
        }
        if let Some(to) = query.published_to {
            qb.push(" AND published_date <= ").push_bind(to);
        }

        qb.push(" ORDER BY ");
        for (field, direction) in &query.sort {
            // Column names come from a closed enum, never from user input.
            qb.push(field.column());
            qb.push(match direction {
                SortDirection::Asc => " ASC, ",
                SortDirection::Desc => " DESC, ",
            });
        }
        qb.push("id ASC");

        qb.push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<BookRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Book::try_from).collect()
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM bookstore.book")
            .fetch_one(&self.pool)
            .await?)
    }
}

/// Escape `LIKE` wildcards so filters match literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Tolkien"), "Tolkien");
    }
}
