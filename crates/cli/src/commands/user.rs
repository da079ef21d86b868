//! User management commands.
//!
//! Self-registration over the API always yields a plain `user`; catalog
//! administrators are created here.
//!
//! ```bash
//! bookstore-cli user create -e admin@example.com -n "Admin Name" -p 'long-password' -r root_admin
//! ```

use std::sync::Arc;

use bookstore_core::UserRole;
use bookstore_server::config::ServerConfig;
use bookstore_server::db::Stores;
use bookstore_server::services::{AuthError, AuthService, LogMailer};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: user, admin, root_admin")]
    InvalidRole(String),

    #[error("Configuration error: {0}")]
    Config(#[from] bookstore_server::config::ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Create a user with the given role.
///
/// Validation (email format, name length, password strength) is the same as
/// for API registration.
pub async fn create_user(
    email: &str,
    name: &str,
    password: &str,
    role: &str,
) -> Result<(), UserError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let config = ServerConfig::from_env()?;
    let pool = connect().await?;
    let stores = Stores::postgres(pool);
    let auth = AuthService::new(stores.users, Arc::new(LogMailer), config.base_url);

    tracing::info!("Creating user: {} ({})", email, role);
    let user = auth.create_user(name, email, password, role).await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}
