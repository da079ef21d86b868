//! Domain models for the bookstore server.
//!
//! These are validated domain types, separate from request DTOs and from
//! database rows.

pub mod book;
pub mod order;
pub mod session;
pub mod user;

pub use book::{Book, BookQuery, NewBook, SortDirection, SortField};
pub use order::{LineItem, NewOrder, Order};
pub use session::{CurrentUser, session_keys};
pub use user::User;
