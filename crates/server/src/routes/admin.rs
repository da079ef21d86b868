//! Administration route handlers.

use axum::{extract::State, response::Response};

use super::ok;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// User and book totals for the dashboard.
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Response> {
    tracing::debug!(admin_id = %admin.id, "reading admin stats");
    Ok(ok(state.admin().stats().await?))
}
