//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use bookstore_core::{UserId, UserRole};

/// Session-stored principal.
///
/// Minimal data the order and catalog services need to authorize a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Role at login time.
    pub role: UserRole,
}

impl CurrentUser {
    /// Whether this principal may read orders owned by other users.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        self.role.can_manage_catalog()
    }
}

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
