//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness check
//! GET  /health/ready                   - Readiness check (database)
//!
//! # Catalog
//! GET    /api/books                    - List books (filters, sort, paging)
//! POST   /api/books                    - Create book (admin)
//! GET    /api/books/{id}               - Book detail
//! PUT    /api/books/{id}               - Replace book (admin)
//! DELETE /api/books/{id}               - Delete book (admin)
//! PUT    /api/books/{id}/cover         - Set cover image URL (admin)
//!
//! # Accounts
//! POST /api/users/register             - Register
//! POST /api/users/login                - Login (sets session)
//! POST /api/users/logout               - Logout
//! POST /api/users/forgot-password      - Mail a reset link
//! POST /api/users/reset-password/{token} - Reset password
//!
//! # Orders (requires auth)
//! POST /api/orders                     - Place order
//! GET  /api/orders                     - Order history
//! GET  /api/orders/{id}                - Order detail
//!
//! # Payments (requires auth)
//! POST /api/payments/initiate          - Create provider intent
//! POST /api/payments/verify            - Settle from provider status
//!
//! # Administration (admin)
//! GET  /admin/stats                    - User and book totals
//! ```
//!
//! Successful responses are `{"success": true, "data": ...}`; errors are
//! `{"success": false, "error": "..."}`.

pub mod admin;
pub mod books;
pub mod health;
pub mod orders;
pub mod payments;
pub mod users;

use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{create_session_layer, request_id_middleware};
use crate::state::AppState;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// `200 OK` with `data` in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data,
    })
    .into_response()
}

/// `201 Created` with `data` in the success envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, ok(data)).into_response()
}

/// Create the catalog routes router.
pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(books::index).post(books::create))
        .route(
            "/{id}",
            get(books::show).put(books::update).delete(books::delete),
        )
        .route("/{id}/cover", put(books::update_cover))
}

/// Create the account routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout))
        .route("/forgot-password", post(users::forgot_password))
        .route("/reset-password/{token}", post(users::reset_password))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(payments::initiate))
        .route("/verify", post(payments::verify))
}

/// Create the administration routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/stats", get(admin::stats))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/books", book_routes())
        .nest("/api/users", user_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/payments", payment_routes())
        .nest("/admin", admin_routes())
}

/// Build the application with its session, tracing and request ID layers.
///
/// Sentry layers are added by the binary, outside this router.
pub fn build_router<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config().is_secure());

    routes()
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use serde_json::Value;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;
    use url::Url;

    use super::*;
    use crate::config::{CacheConfig, PaymentConfig, ServerConfig};
    use crate::db::{InMemoryStore, Stores};
    use crate::payments::PaymentGateways;
    use crate::services::LogMailer;

    fn app() -> Router {
        let config = ServerConfig {
            database_url: None,
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("http://127.0.0.1:3000").unwrap(),
            payments: PaymentConfig::default(),
            cache: CacheConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        };
        let state = AppState::new(
            config,
            Stores::in_memory(&InMemoryStore::new()),
            PaymentGateways::new(),
            Arc::new(LogMailer),
        );
        build_router(state, MemoryStore::default())
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_empty_catalog_listing() {
        let (status, body) = send(
            Request::get("/api/books?page=1&limit=5&sort=price:desc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_session() {
        let (status, body) = send(
            Request::post("/api/orders")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"items":[],"totalPrice":"1","paymentMethod":"stripe"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(Request::delete("/api/books/1").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(Request::get("/admin/stats").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Login required");
    }

    #[tokio::test]
    async fn test_unknown_book_is_not_found() {
        let (status, body) = send(Request::get("/api/books/77").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "book 77 not found");
    }
}
