//! Business logic services.
//!
//! # Services
//!
//! - `admin` - Dashboard totals for administrators
//! - `auth` - Registration, login and password reset
//! - `catalog` - Book management and cached catalog reads
//! - `mail` - Outgoing mail used by the password reset flow
//! - `orders` - Checkout and the payment state machine

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod mail;
pub mod orders;

pub use admin::{AdminService, AdminStats};
pub use auth::{AuthError, AuthService};
pub use catalog::{BookInput, CatalogCache, CatalogError, CatalogService, ListParams};
pub use mail::{LogMailer, MailError, Mailer};
pub use orders::{OrderError, OrderService, OrderSettings, OrderStores, PlaceOrder};
