//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};

use bookstore_core::OrderId;

use super::{created, ok};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::services::PlaceOrder;
use crate::state::AppState;

/// Place an order, reserving its stock.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<PlaceOrder>,
) -> Result<Response> {
    let order = state.orders().place_order(&user, body).await?;
    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_id", &order.id.to_string())]),
    );
    Ok(created(order))
}

/// The caller's orders, newest first.
pub async fn index(State(state): State<AppState>, RequireAuth(user): RequireAuth) -> Result<Response> {
    Ok(ok(state.orders().orders_for_user(&user).await?))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Response> {
    Ok(ok(state.orders().order(&user, id).await?))
}
