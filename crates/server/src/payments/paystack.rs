//! Paystack transactions.
//!
//! The merchant chooses the transaction reference, so each initiation mints a
//! fresh one. The customer pays on Paystack's hosted page and is sent back to
//! the callback URL.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use bookstore_core::PaymentMethod;

use super::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentRequest, endpoint,
    handle_response, merchant_reference, top_level_message, transport_error, verify_error,
};

/// Paystack API base URL.
const BASE_URL: &str = "https://api.paystack.co/";

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    amount: i64,
    currency: &'a str,
    email: &'a str,
    reference: &'a str,
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

/// Gateway for `PaymentMethod::Paystack`.
#[derive(Clone)]
pub struct PaystackGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl PaystackGateway {
    /// Create a gateway against the live Paystack API.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP client fails to build.
    pub fn new(secret_key: &SecretString, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(BASE_URL)
            .map_err(|e| GatewayError::Unavailable(format!("invalid provider URL: {e}")))?;
        Self::with_base_url(secret_key, timeout, base_url)
    }

    /// Create a gateway against another Paystack-compatible endpoint.
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

/// Map a transaction `status` to an outcome.
///
/// `abandoned` means the checkout page was opened but not completed; the
/// customer can still come back to it.
fn outcome(status: &str) -> PaymentOutcome {
    match status {
        "success" => PaymentOutcome::Succeeded,
        "failed" | "reversed" => PaymentOutcome::Failed,
        "abandoned" | "ongoing" | "pending" | "processing" | "queued" => PaymentOutcome::Pending,
        other => {
            warn!(status = other, "unknown Paystack transaction status");
            PaymentOutcome::Pending
        }
    }
}

/// Unwrap `{status, message, data}`, treating `status: false` as a decline.
fn into_data<T>(envelope: Envelope<T>) -> Result<T, GatewayError> {
    let message = envelope.message.unwrap_or_default();
    if !envelope.status {
        return Err(GatewayError::Declined(message));
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::Unavailable(format!("response without data: {message}")))
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paystack
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        let amount = request
            .amount
            .to_minor_units()
            .map_err(|e| GatewayError::Declined(e.to_string()))?;
        let reference = merchant_reference(request.order_id);
        let body = InitializeRequest {
            amount,
            currency: request.amount.currency_code.code(),
            email: request.email.as_str(),
            reference: &reference,
            callback_url: request.return_url.as_str(),
        };

        let url = endpoint(&self.base_url, "transaction/initialize")?;
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let data: InitializeData =
            into_data(handle_response(response, top_level_message).await?)?;

        debug!(order_id = %request.order_id, reference = %data.reference, "initialized Paystack transaction");
        Ok(PaymentIntent {
            provider_reference: data.reference,
            redirect_url: Some(data.authorization_url),
            client_secret: None,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError> {
        let mut url = endpoint(&self.base_url, "transaction/verify/")?;
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
        let data: VerifyData = handle_response(response, top_level_message)
            .await
            .and_then(into_data)
            .map_err(verify_error)?;
        Ok(outcome(&data.status))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};

    use bookstore_core::{CurrencyCode, Email, OrderId, Price};

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(outcome("success"), PaymentOutcome::Succeeded);
        assert_eq!(outcome("failed"), PaymentOutcome::Failed);
        assert_eq!(outcome("reversed"), PaymentOutcome::Failed);
        assert_eq!(outcome("abandoned"), PaymentOutcome::Pending);
    }

    #[test]
    fn test_false_status_is_declined() {
        let envelope: Envelope<VerifyData> = Envelope {
            status: false,
            message: Some("Invalid key".to_owned()),
            data: None,
        };
        assert_eq!(
            into_data(envelope).unwrap_err(),
            GatewayError::Declined("Invalid key".to_owned())
        );
    }

    async fn fake_paystack() -> Url {
        let app = Router::new()
            .route(
                "/transaction/initialize",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["amount"], 250_000);
                    assert_eq!(body["currency"], "NGN");
                    assert_eq!(body["email"], "reader@example.com");
                    Json(json!({
                        "status": true,
                        "message": "Authorization URL created",
                        "data": {
                            "authorization_url": "https://checkout.paystack.com/abc",
                            "access_code": "abc",
                            "reference": body["reference"]
                        }
                    }))
                }),
            )
            .route(
                "/transaction/verify/{reference}",
                get(|Path(reference): Path<String>| async move {
                    if reference.starts_with("bk-3-") {
                        (
                            StatusCode::OK,
                            Json(json!({"status": true, "message": "ok", "data": {"status": "failed"}})),
                        )
                    } else {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"status": false, "message": "Transaction reference not found"})),
                        )
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn test_initiate_and_verify_against_fake_api() {
        let gateway = PaystackGateway::with_base_url(
            &SecretString::from("sk_test_123"),
            Duration::from_secs(5),
            fake_paystack().await,
        )
        .unwrap();

        let intent = gateway
            .initiate(&PaymentRequest {
                order_id: OrderId::new(3),
                amount: Price::new(Decimal::new(2500, 0), CurrencyCode::NGN),
                email: Email::parse("reader@example.com").unwrap(),
                return_url: Url::parse("http://localhost/return").unwrap(),
            })
            .await
            .unwrap();
        assert!(intent.provider_reference.starts_with("bk-3-"));
        assert_eq!(
            intent.redirect_url.as_deref(),
            Some("https://checkout.paystack.com/abc")
        );

        assert_eq!(
            gateway.verify(&intent.provider_reference).await.unwrap(),
            PaymentOutcome::Failed
        );
        assert_eq!(
            gateway.verify("nope").await.unwrap_err(),
            GatewayError::InvalidReference("Transaction reference not found".to_owned())
        );
    }
}
