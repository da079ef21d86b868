//! Account route handlers.
//!
//! Login stores a [`CurrentUser`] in the session; logout drops the session.

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use super::{created, ok};
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Registration body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Forgot password body.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset password body.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

fn session_error(e: &tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {e}"))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response> {
    let user = state
        .auth()
        .register(&body.name, &body.email, &body.password)
        .await?;
    Ok(created(user))
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    let user = state.auth().login(&body.email, &body.password).await?;

    let principal = CurrentUser {
        id: user.id,
        role: user.role,
    };
    set_current_user(&session, &principal)
        .await
        .map_err(|e| session_error(&e))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(ok(user))
}

pub async fn logout(session: Session) -> Result<Response> {
    clear_current_user(&session)
        .await
        .map_err(|e| session_error(&e))?;
    clear_sentry_user();
    Ok(ok(json!({ "message": "Logged out" })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Response> {
    state.auth().forgot_password(&body.email).await?;
    Ok(ok(json!({
        "message": "If the address is registered, a reset link has been sent"
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Response> {
    state.auth().reset_password(&token, &body.password).await?;
    Ok(ok(json!({ "message": "Password updated successfully" })))
}
