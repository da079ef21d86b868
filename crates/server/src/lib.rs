//! Bookstore API server library.
//!
//! Catalog, accounts, orders and payments behind an axum router. The binary
//! in `main.rs` wires configuration, storage and providers together; tests
//! build the same router over the in-memory store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
