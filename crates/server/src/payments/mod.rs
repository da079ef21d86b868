//! Payment provider adapters.
//!
//! Every provider is reached through the same [`PaymentGateway`] capability:
//! `initiate` creates a provider-side intent for an order and `verify` asks
//! the provider how that intent ended. Provider errors are normalized into
//! [`GatewayError`] so the orchestrator can decide between "retry later",
//! "payment declined" and "caller error" without knowing the provider.
//!
//! # Providers
//!
//! - [`stripe::StripeGateway`] - Payment Intents API
//! - [`paystack::PaystackGateway`] - Transaction initialize/verify
//! - [`flutterwave::FlutterwaveGateway`] - Standard checkout

pub mod flutterwave;
pub mod paystack;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use bookstore_core::{Email, OrderId, PaymentMethod, Price};

use crate::config::PaymentConfig;

/// Normalized provider failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure, timeout, 5xx or rate limiting. Safe to retry.
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the payment. Terminal for the order.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The provider does not know the reference.
    #[error("invalid payment reference: {0}")]
    InvalidReference(String),
}

/// What the orchestrator asks a provider to charge.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Price,
    /// Customer email, required by Paystack and Flutterwave.
    pub email: Email,
    /// Where the provider sends the customer after checkout.
    pub return_url: Url,
}

/// A provider-side intent created by [`PaymentGateway::initiate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Identifier used later to verify the payment.
    pub provider_reference: String,
    /// Hosted checkout page, for redirect-based providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Client secret, for providers confirmed from the browser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Provider's view of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    /// Not settled yet. The order keeps waiting.
    Pending,
}

/// Uniform capability over a third-party payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which `PaymentMethod` this gateway serves.
    fn method(&self) -> PaymentMethod;

    /// Create a provider intent for the order. Only starts the flow.
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentIntent, GatewayError>;

    /// Ask the provider how the intent identified by `reference` ended.
    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError>;
}

/// Gateways keyed by the payment method they serve.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway under its own method, replacing any previous one.
    #[must_use]
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    /// Build every gateway whose secret key is configured.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if an HTTP client cannot be built.
    pub fn from_config(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let mut gateways = Self::new();
        if let Some(key) = &config.stripe_secret_key {
            gateways = gateways.with(Arc::new(stripe::StripeGateway::new(key, config.timeout)?));
        }
        if let Some(key) = &config.paystack_secret_key {
            gateways =
                gateways.with(Arc::new(paystack::PaystackGateway::new(key, config.timeout)?));
        }
        if let Some(key) = &config.flutterwave_secret_key {
            gateways = gateways.with(Arc::new(flutterwave::FlutterwaveGateway::new(
                key,
                config.timeout,
            )?));
        }
        Ok(gateways)
    }

    /// Gateway for `method`, if one is registered.
    #[must_use]
    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&method).cloned()
    }

    /// Whether orders may be placed with `method`.
    #[must_use]
    pub fn supports(&self, method: PaymentMethod) -> bool {
        self.gateways.contains_key(&method)
    }

    /// Registered methods, in declaration order.
    #[must_use]
    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.supports(*m))
            .collect()
    }
}

impl std::fmt::Debug for PaymentGateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateways")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Build a provider HTTP client that sends `Authorization: Bearer <key>`.
pub(crate) fn bearer_client(
    secret_key: &SecretString,
    timeout: Duration,
) -> Result<reqwest::Client, GatewayError> {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", secret_key.expose_secret()))
        .map_err(|e| GatewayError::Unavailable(format!("invalid API key format: {e}")))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {e}")))
}

/// Classify a transport-level failure (connect, timeout, body decode).
pub(crate) fn transport_error(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Unavailable("request timed out".to_owned())
    } else if e.is_decode() {
        GatewayError::Unavailable(format!("unreadable provider response: {e}"))
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn status_error(status: StatusCode, message: String) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::InvalidReference(message),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN => GatewayError::Unavailable(format!("{status}: {message}")),
        s if s.is_server_error() => GatewayError::Unavailable(format!("{status}: {message}")),
        _ => GatewayError::Declined(message),
    }
}

/// Reinterpret an error from a verification call.
///
/// Looking up an existing intent cannot decline a payment, so a 4xx the
/// charge path would treat as a refusal means the provider rejected the
/// reference or the request.
pub(crate) fn verify_error(e: GatewayError) -> GatewayError {
    match e {
        GatewayError::Declined(message) => GatewayError::InvalidReference(message),
        other => other,
    }
}

/// Read a response body, turning non-2xx statuses into a [`GatewayError`].
///
/// `extract_message` pulls the provider's human-readable error out of the
/// body so it can be logged and surfaced.
pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    extract_message: fn(&serde_json::Value) -> Option<String>,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| transport_error(&e));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| extract_message(&v))
        .unwrap_or(body);
    Err(status_error(status, message))
}

/// Extract `message` from a `{"message": ...}` error body.
pub(crate) fn top_level_message(body: &serde_json::Value) -> Option<String> {
    body.get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

/// Provider reference for redirect-based providers that let the merchant
/// choose it.
pub(crate) fn merchant_reference(order_id: OrderId) -> String {
    format!("bk-{order_id}-{}", uuid::Uuid::new_v4().simple())
}

/// Join a path onto a provider base URL.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, GatewayError> {
    base.join(path)
        .map_err(|e| GatewayError::Unavailable(format!("invalid provider URL: {e}")))
}
