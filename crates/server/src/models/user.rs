//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bookstore_core::{Email, UserId, UserRole};

/// A registered user (domain type).
///
/// The password hash and reset token never leave the repository layer
/// inside this type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized email address (unique).
    pub email: Email,
    /// Permission level.
    pub role: UserRole,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
