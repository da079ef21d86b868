//! Core types for the bookstore.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod isbn;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use isbn::{Isbn, IsbnError};
pub use price::{CurrencyCode, MoneyError, Price};
pub use status::*;
