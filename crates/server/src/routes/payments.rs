//! Payment route handlers.
//!
//! `initiate` hands the client what it needs to pay with the provider (a
//! redirect URL or a client secret). `verify` is called when the customer
//! returns and is safe to repeat.

use axum::{Json, extract::State, response::Response};
use serde::{Deserialize, Serialize};

use bookstore_core::{OrderId, PaymentMethod};

use super::ok;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::payments::PaymentIntent;
use crate::state::AppState;

/// Initiate payment body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub order_id: OrderId,
    /// Pay with a different provider than the one chosen at checkout.
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// Initiate payment response.
#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub order: Order,
    pub payment: PaymentIntent,
}

/// Verify payment body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub order_id: OrderId,
    /// Provider reference; return redirects send it as `ref`.
    #[serde(alias = "ref")]
    pub reference: String,
}

pub async fn initiate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<InitiateRequest>,
) -> Result<Response> {
    let (order, payment) = state
        .orders()
        .initiate_payment(&user, body.order_id, body.payment_method)
        .await?;
    Ok(ok(InitiateResponse { order, payment }))
}

pub async fn verify(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<VerifyRequest>,
) -> Result<Response> {
    let order = state
        .orders()
        .verify_payment(&user, body.order_id, &body.reference)
        .await?;
    Ok(ok(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_body_accepts_ref_alias() {
        let body: VerifyRequest =
            serde_json::from_str(r#"{"orderId": 7, "ref": "pi_123"}"#).unwrap();
        assert_eq!(body.order_id, OrderId::new(7));
        assert_eq!(body.reference, "pi_123");

        let body: VerifyRequest =
            serde_json::from_str(r#"{"orderId": 7, "reference": "pi_456"}"#).unwrap();
        assert_eq!(body.reference, "pi_456");
    }
}
