//! Bookstore Core - Shared domain types.
//!
//! This crate provides the types shared by the bookstore crates:
//! - `server` - HTTP API, order/payment orchestration, persistence
//! - `cli` - Migrations, seeding and user administration
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Database encodings are available
//! behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, money, emails, ISBNs and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
