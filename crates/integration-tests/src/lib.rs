//! Integration test harness for the bookstore backend.
//!
//! Everything runs in-process on the in-memory store, so no database or
//! provider account is needed:
//!
//! ```bash
//! cargo test -p bookstore-integration-tests
//! ```
//!
//! [`ScriptedGateway`] stands in for a payment provider and answers from a
//! script. [`TestShop`] seeds one customer and a small catalog and builds
//! either an [`OrderService`] or the full HTTP router on top of them.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tower_sessions::MemoryStore;
use url::Url;

use bookstore_core::{BookId, CurrencyCode, Email, Isbn, PaymentMethod, UserRole};
use bookstore_server::config::{CacheConfig, PaymentConfig, ServerConfig};
use bookstore_server::db::{BookRepository, InMemoryStore, Stores, UserRepository};
use bookstore_server::models::{CurrentUser, LineItem, NewBook};
use bookstore_server::payments::{
    GatewayError, PaymentGateway, PaymentGateways, PaymentIntent, PaymentOutcome, PaymentRequest,
};
use bookstore_server::routes::build_router;
use bookstore_server::services::{
    AuthService, LogMailer, OrderService, OrderSettings, OrderStores, PlaceOrder,
};
use bookstore_server::state::AppState;

/// Provider call timeout used by every harness-built service.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_millis(200);

// =============================================================================
// Scripted payment provider
// =============================================================================

/// Payment provider double.
///
/// `initiate` always answers with the same result and hands out references
/// `ref_1`, `ref_2`, ... `verify` pops scripted outcomes in order and reports
/// `Pending` once the script runs out.
pub struct ScriptedGateway {
    method: PaymentMethod,
    decline_initiate: Option<String>,
    outcomes: Mutex<VecDeque<Result<PaymentOutcome, GatewayError>>>,
    delay: Duration,
    initiated: AtomicUsize,
    verified: AtomicUsize,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            decline_initiate: None,
            outcomes: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            initiated: AtomicUsize::new(0),
            verified: AtomicUsize::new(0),
        }
    }

    /// Answer verifications with `outcomes`, in order.
    #[must_use]
    pub fn with_outcomes(self, outcomes: Vec<Result<PaymentOutcome, GatewayError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..self
        }
    }

    /// Refuse every initiation.
    #[must_use]
    pub fn declining(self, message: &str) -> Self {
        Self {
            decline_initiate: Some(message.to_owned()),
            ..self
        }
    }

    /// Sleep before answering each verification.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Number of `verify` calls that reached the provider.
    pub fn verify_calls(&self) -> usize {
        self.verified.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        if let Some(message) = &self.decline_initiate {
            return Err(GatewayError::Declined(message.clone()));
        }
        let n = self.initiated.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            provider_reference: format!("ref_{n}"),
            redirect_url: Some(format!("https://checkout.test/ref_{n}")),
            client_secret: None,
        })
    }

    async fn verify(&self, _reference: &str) -> Result<PaymentOutcome, GatewayError> {
        tokio::time::sleep(self.delay).await;
        self.verified.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(PaymentOutcome::Pending))
    }
}

// =============================================================================
// Seeded shop
// =============================================================================

/// An in-memory shop with one customer and two books.
pub struct TestShop {
    pub store: InMemoryStore,
    pub customer: CurrentUser,
    /// 19.99, 5 in stock.
    pub novel: BookId,
    /// 12.50, 2 in stock.
    pub poems: BookId,
}

impl TestShop {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        let user = UserRepository::create(
            &store,
            "Ada Obi",
            &Email::parse("ada@example.com").unwrap(),
            "not-a-real-hash",
            UserRole::User,
        )
        .await
        .unwrap();

        let novel = add_book(&store, "Things Fall Apart", "978-0385474542", 1999, 5).await;
        let poems = add_book(&store, "Collected Poems", "978-0374529000", 1250, 2).await;

        Self {
            store,
            customer: CurrentUser {
                id: user.id,
                role: UserRole::User,
            },
            novel,
            poems,
        }
    }

    /// Order service over this shop with `gateway` as the only provider.
    pub fn orders(&self, gateway: Arc<ScriptedGateway>) -> OrderService {
        OrderService::new(
            OrderStores {
                books: Arc::new(self.store.clone()),
                inventory: Arc::new(self.store.clone()),
                orders: Arc::new(self.store.clone()),
                users: Arc::new(self.store.clone()),
            },
            PaymentGateways::new().with(gateway),
            OrderSettings {
                currency: CurrencyCode::USD,
                gateway_timeout: GATEWAY_TIMEOUT,
                base_url: Url::parse("http://127.0.0.1:3000").unwrap(),
            },
        )
    }

    /// The full HTTP application over this shop.
    pub fn router(&self, gateway: Arc<ScriptedGateway>) -> Router {
        let config = ServerConfig {
            database_url: None,
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("http://127.0.0.1:3000").unwrap(),
            payments: PaymentConfig {
                timeout: GATEWAY_TIMEOUT,
                ..PaymentConfig::default()
            },
            cache: CacheConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        };
        let state = AppState::new(
            config,
            Stores::in_memory(&self.store),
            PaymentGateways::new().with(gateway),
            Arc::new(LogMailer),
        );
        build_router(state, MemoryStore::default())
    }

    /// Add an `admin` account that can log in with `password`.
    pub async fn add_admin(&self, email: &str, password: &str) {
        AuthService::new(
            Arc::new(self.store.clone()),
            Arc::new(LogMailer),
            Url::parse("http://127.0.0.1:3000").unwrap(),
        )
        .create_user("Shop Admin", email, password, UserRole::Admin)
        .await
        .unwrap();
    }

    pub async fn stock(&self, book: BookId) -> i32 {
        self.store.stock_of(book).await.unwrap()
    }
}

async fn add_book(store: &InMemoryStore, title: &str, isbn: &str, cents: i64, stock: i32) -> BookId {
    BookRepository::create(
        store,
        &NewBook {
            title: title.to_owned(),
            author: "Test Author".to_owned(),
            published_date: NaiveDate::from_ymd_opt(1958, 6, 17).unwrap(),
            isbn: Isbn::parse(isbn).unwrap(),
            price: Decimal::new(cents, 2),
            stock,
            description: None,
        },
    )
    .await
    .unwrap()
    .id
}

/// Checkout request paid with Stripe.
#[must_use]
pub fn checkout(items: &[(BookId, i32)], total: Decimal) -> PlaceOrder {
    PlaceOrder {
        items: items
            .iter()
            .map(|&(book, quantity)| LineItem::new(book, quantity))
            .collect(),
        total_price: total,
        payment_method: PaymentMethod::Stripe,
    }
}
