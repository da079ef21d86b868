//! Stripe Payment Intents.
//!
//! `initiate` creates a payment intent and hands its client secret back to
//! the browser, which confirms the card with Stripe.js. `verify` reads the
//! intent's `status`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use bookstore_core::PaymentMethod;

use super::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentRequest, endpoint,
    handle_response, transport_error, verify_error,
};

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/";

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
}

/// Gateway for `PaymentMethod::Stripe`.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl StripeGateway {
    /// Create a gateway against the live Stripe API.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP client fails to build.
    pub fn new(secret_key: &SecretString, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(BASE_URL)
            .map_err(|e| GatewayError::Unavailable(format!("invalid provider URL: {e}")))?;
        Self::with_base_url(secret_key, timeout, base_url)
    }

    /// Create a gateway against another Stripe-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP client fails to build.
    pub fn with_base_url(
        secret_key: &SecretString,
        timeout: Duration,
        base_url: Url,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: super::bearer_client(secret_key, timeout)?,
            base_url,
        })
    }
}

/// Map a payment intent `status` to an outcome.
///
/// `requires_payment_method` is both the initial state and the state after a
/// failed attempt; the customer may still retry, so it stays pending.
fn outcome(status: &str) -> PaymentOutcome {
    match status {
        "succeeded" => PaymentOutcome::Succeeded,
        "canceled" => PaymentOutcome::Failed,
        "requires_payment_method" | "requires_confirmation" | "requires_action"
        | "processing" | "requires_capture" => PaymentOutcome::Pending,
        other => {
            warn!(status = other, "unknown Stripe payment intent status");
            PaymentOutcome::Pending
        }
    }
}

fn error_message(body: &serde_json::Value) -> Option<String> {
    body.pointer("/error/message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        let amount = request
            .amount
            .to_minor_units()
            .map_err(|e| GatewayError::Declined(e.to_string()))?;
        let order_id = request.order_id.to_string();
        let form = [
            ("amount", amount.to_string()),
            (
                "currency",
                request.amount.currency_code.code().to_ascii_lowercase(),
            ),
            ("description", format!("Bookstore order #{order_id}")),
            ("metadata[order_id]", order_id),
            ("receipt_email", request.email.as_str().to_owned()),
        ];

        let url = endpoint(&self.base_url, "v1/payment_intents")?;
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let intent: StripePaymentIntent = handle_response(response, error_message).await?;

        debug!(order_id = %request.order_id, intent = %intent.id, "created Stripe payment intent");
        Ok(PaymentIntent {
            provider_reference: intent.id,
            redirect_url: None,
            client_secret: intent.client_secret,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError> {
        let mut url = endpoint(&self.base_url, "v1/payment_intents/")?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::Unavailable("provider URL cannot be a base".to_owned()))?
            .pop_if_empty()
            .push(reference);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let intent: StripePaymentIntent = handle_response(response, error_message)
            .await
            .map_err(verify_error)?;
        Ok(outcome(&intent.status))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::{Form, Path};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    use bookstore_core::{CurrencyCode, Email, OrderId, Price};

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(outcome("succeeded"), PaymentOutcome::Succeeded);
        assert_eq!(outcome("canceled"), PaymentOutcome::Failed);
        assert_eq!(outcome("processing"), PaymentOutcome::Pending);
        assert_eq!(outcome("requires_payment_method"), PaymentOutcome::Pending);
        assert_eq!(outcome("something_new"), PaymentOutcome::Pending);
    }

    async fn fake_stripe() -> Url {
        let app = Router::new()
            .route(
                "/v1/payment_intents",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(form.get("amount").map(String::as_str), Some("1999"));
                    assert_eq!(form.get("currency").map(String::as_str), Some("usd"));
                    assert_eq!(form.get("metadata[order_id]").map(String::as_str), Some("12"));
                    Json(json!({
                        "id": "pi_123",
                        "status": "requires_payment_method",
                        "client_secret": "pi_123_secret_abc"
                    }))
                }),
            )
            .route(
                "/v1/payment_intents/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "pi_123" => (
                            StatusCode::OK,
                            Json(json!({"id": "pi_123", "status": "succeeded"})),
                        ),
                        "pi_malformed" => (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": {"message": "Invalid API request"}})),
                        ),
                        _ => (
                            StatusCode::NOT_FOUND,
                            Json::<Value>(json!({"error": {"message": "No such payment_intent"}})),
                        ),
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    fn gateway(base_url: Url) -> StripeGateway {
        StripeGateway::with_base_url(
            &SecretString::from("sk_test_123"),
            Duration::from_secs(5),
            base_url,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_and_verify_against_fake_api() {
        let gateway = gateway(fake_stripe().await);
        let intent = gateway
            .initiate(&PaymentRequest {
                order_id: OrderId::new(12),
                amount: Price::new(Decimal::new(1999, 2), CurrencyCode::USD),
                email: Email::parse("reader@example.com").unwrap(),
                return_url: Url::parse("http://localhost/return").unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(intent.provider_reference, "pi_123");
        assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_abc"));

        assert_eq!(
            gateway.verify("pi_123").await.unwrap(),
            PaymentOutcome::Succeeded
        );
        assert_eq!(
            gateway.verify("pi_unknown").await.unwrap_err(),
            GatewayError::InvalidReference("No such payment_intent".to_owned())
        );
    }

    #[tokio::test]
    async fn test_bad_request_on_verify_is_not_a_decline() {
        let gateway = gateway(fake_stripe().await);
        assert_eq!(
            gateway.verify("pi_malformed").await.unwrap_err(),
            GatewayError::InvalidReference("Invalid API request".to_owned())
        );
    }
}
