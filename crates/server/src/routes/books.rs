//! Catalog route handlers.
//!
//! Reads are public; writes need an admin session.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use bookstore_core::BookId;

use super::{created, ok};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::services::{BookInput, ListParams};
use crate::state::AppState;

/// Cover image update body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverRequest {
    /// URL of the already uploaded image.
    pub cover_image: String,
}

/// List books with filters, sorting and paging.
pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let books = state.catalog().list(params).await?;
    Ok(ok(books.as_slice()))
}

pub async fn show(State(state): State<AppState>, Path(id): Path<BookId>) -> Result<Response> {
    Ok(ok(state.catalog().get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<BookInput>,
) -> Result<Response> {
    tracing::debug!(admin_id = %admin.id, "creating book");
    Ok(created(state.catalog().create(input).await?))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BookId>,
    Json(input): Json<BookInput>,
) -> Result<Response> {
    Ok(ok(state.catalog().update(id, input).await?))
}

pub async fn update_cover(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BookId>,
    Json(body): Json<CoverRequest>,
) -> Result<Response> {
    Ok(ok(state.catalog().set_cover(id, &body.cover_image).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<BookId>,
) -> Result<Response> {
    Ok(ok(state.catalog().delete(id).await?))
}
