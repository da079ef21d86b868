//! Authentication service.
//!
//! Provides password registration and login, plus the forgot/reset password
//! flow. Reset tokens have the form `{user_id}.{secret}`; only an Argon2
//! hash of the secret is stored, next to its expiry.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::{info, instrument, warn};
use url::Url;

use bookstore_core::{Email, UserId, UserRole};

use crate::db::{RepositoryError, UserRepository};
use crate::models::User;
use crate::services::mail::Mailer;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length, in characters.
const MAX_NAME_LENGTH: usize = 100;

/// Random bytes in a reset token secret.
const RESET_TOKEN_BYTES: usize = 32;

/// How long a reset token stays valid.
const RESET_TOKEN_TTL_MINUTES: i64 = 15;

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    base_url: Url,
}

impl AuthService {
    /// Create a new authentication service.
    ///
    /// `base_url` is the public URL reset links point at.
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, mailer: Arc<dyn Mailer>, base_url: Url) -> Self {
        Self {
            users,
            mailer,
            base_url,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a customer account.
    ///
    /// Self-registration always creates `UserRole::User`; staff accounts are
    /// created from the CLI.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `AuthError::InvalidName` or
    /// `AuthError::WeakPassword` for bad input and
    /// `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        self.create_user(name, email, password, UserRole::User).await
    }

    /// Create an account with any role.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(&name, &email, &password_hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, %role, "user created");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Issue a reset token and mail a reset link.
    ///
    /// Unknown addresses succeed silently so the endpoint does not reveal
    /// which emails are registered.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for malformed input and
    /// `AuthError::Mail` if the link could not be sent.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let Some((user, _)) = self.users.get_credentials(&email).await? else {
            warn!("password reset requested for unknown email");
            return Ok(());
        };

        let mut secret = [0u8; RESET_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut secret);
        let secret = hex::encode(secret);
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        self.users
            .set_reset_token(user.id, &hash_password(&secret)?, expires_at)
            .await?;

        let token = format!("{}.{secret}", user.id);
        let link = self.reset_link(&token);
        self.mailer
            .send(
                &user.email,
                "Password Reset",
                &format!(
                    "Use this link within {RESET_TOKEN_TTL_MINUTES} minutes to reset your password: {link}"
                ),
            )
            .await?;

        info!(user_id = %user.id, "password reset link sent");
        Ok(())
    }

    /// Replace the password of the user a reset token was issued to.
    ///
    /// The token is single use.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` unless the token is the user's
    /// current, unexpired token, and `AuthError::WeakPassword` if the new
    /// password is too short.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AuthError> {
        let (user_id, secret) = parse_reset_token(token)?;
        let (stored_hash, expires_at) = self
            .users
            .get_reset_token(user_id)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        if expires_at <= Utc::now() {
            return Err(AuthError::InvalidResetToken);
        }
        verify_password(secret, &stored_hash).map_err(|_| AuthError::InvalidResetToken)?;
        validate_password(password)?;

        self.users
            .complete_password_reset(user_id, &hash_password(password)?)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::InvalidResetToken,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user_id, "password reset");
        Ok(())
    }

    fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/api/users/reset-password/{token}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

/// Split `{user_id}.{secret}`.
fn parse_reset_token(token: &str) -> Result<(UserId, &str), AuthError> {
    let (id, secret) = token.split_once('.').ok_or(AuthError::InvalidResetToken)?;
    let id: i32 = id.parse().map_err(|_| AuthError::InvalidResetToken)?;
    if secret.is_empty() {
        return Err(AuthError::InvalidResetToken);
    }
    Ok((UserId::new(id), secret))
}

fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::InvalidName("name is required".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
