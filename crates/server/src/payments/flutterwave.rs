//! Flutterwave Standard checkout.
//!
//! Amounts are sent in major units. Flutterwave only creates a transaction
//! once the customer attempts payment on the hosted page, so verifying a
//! reference we issued that Flutterwave has not seen yet is still pending.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use bookstore_core::PaymentMethod;

use super::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentRequest, endpoint,
    merchant_reference, status_error, top_level_message, transport_error, verify_error,
};

/// Flutterwave API base URL.
const BASE_URL: &str = "https://api.flutterwave.com/";

#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    tx_ref: &'a str,
    amount: Decimal,
    currency: &'a str,
    redirect_url: &'a str,
    customer: Customer<'a>,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    status: String,
}

/// Gateway for `PaymentMethod::Flutterwave`.
#[derive(Clone)]
pub struct FlutterwaveGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl FlutterwaveGateway {
    /// Create a gateway against the live Flutterwave API.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP client fails to build.
    pub fn new(secret_key: &SecretString, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(BASE_URL)
            .map_err(|e| GatewayError::Unavailable(format!("invalid provider URL: {e}")))?;
        Self::with_base_url(secret_key, timeout, base_url)
    }

    /// Create a gateway against another Flutterwave-compatible endpoint.
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

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<(StatusCode, Envelope<T>), GatewayError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;
        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => Ok((status, envelope)),
            Err(_) if !status.is_success() => {
                let message = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| top_level_message(&v))
                    .unwrap_or(body);
                Err(status_error(status, message))
            }
            Err(e) => Err(GatewayError::Unavailable(format!(
                "unreadable provider response: {e}"
            ))),
        }
    }
}

/// Map a transaction `status` to an outcome.
fn outcome(status: &str) -> PaymentOutcome {
    match status {
        "successful" => PaymentOutcome::Succeeded,
        "failed" | "cancelled" => PaymentOutcome::Failed,
        "pending" => PaymentOutcome::Pending,
        other => {
            warn!(status = other, "unknown Flutterwave transaction status");
            PaymentOutcome::Pending
        }
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Flutterwave
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        if request.amount.amount <= Decimal::ZERO {
            return Err(GatewayError::Declined("amount must be positive".to_owned()));
        }
        let tx_ref = merchant_reference(request.order_id);
        let body = PaymentBody {
            tx_ref: &tx_ref,
            amount: request.amount.amount.round_dp(2),
            currency: request.amount.currency_code.code(),
            redirect_url: request.return_url.as_str(),
            customer: Customer {
                email: request.email.as_str(),
            },
        };

        let url = endpoint(&self.base_url, "v3/payments")?;
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let (status, envelope) = Self::read::<LinkData>(response).await?;

        let message = envelope.message.unwrap_or_default();
        if !status.is_success() {
            return Err(status_error(status, message));
        }
        if envelope.status != "success" {
            return Err(GatewayError::Declined(message));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Unavailable("response without data".to_owned()))?;

        debug!(order_id = %request.order_id, tx_ref = %tx_ref, "created Flutterwave payment link");
        Ok(PaymentIntent {
            provider_reference: tx_ref,
            redirect_url: Some(data.link),
            client_secret: None,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError> {
        let mut url = endpoint(&self.base_url, "v3/transactions/verify_by_reference")?;
        url.query_pairs_mut().append_pair("tx_ref", reference);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let (status, envelope) = Self::read::<TransactionData>(response).await?;

        if status == StatusCode::NOT_FOUND
            || (status == StatusCode::BAD_REQUEST
                && envelope
                    .message
                    .as_deref()
                    .is_some_and(|m| m.starts_with("No transaction")))
        {
            return Ok(PaymentOutcome::Pending);
        }
        if !status.is_success() {
            return Err(verify_error(status_error(
                status,
                envelope.message.unwrap_or_default(),
            )));
        }

        envelope
            .data
            .map(|d| outcome(&d.status))
            .ok_or_else(|| GatewayError::Unavailable("response without data".to_owned()))
    }
}
