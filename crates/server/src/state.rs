//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::db::Stores;
use crate::payments::PaymentGateways;
use crate::services::{
    AdminService, AuthService, CatalogCache, CatalogService, Mailer, OrderService, OrderSettings, OrderStores,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and wires the services to the
/// storage backend, payment gateways and mailer chosen by the entry point.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: Option<PgPool>,
    catalog: CatalogService,
    orders: OrderService,
    auth: AuthService,
    admin: AdminService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `stores` - Repository handles (`PostgreSQL` or in-memory)
    /// * `gateways` - Registered payment providers
    /// * `mailer` - Outgoing mail for password resets
    #[must_use]
    pub fn new(
        config: ServerConfig,
        stores: Stores,
        gateways: PaymentGateways,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let catalog = CatalogService::new(
            Arc::clone(&stores.books),
            CatalogCache::new(&config.cache),
        );
        let orders = OrderService::new(
            OrderStores {
                books: Arc::clone(&stores.books),
                inventory: Arc::clone(&stores.inventory),
                orders: Arc::clone(&stores.orders),
                users: Arc::clone(&stores.users),
            },
            gateways,
            OrderSettings {
                currency: config.payments.currency,
                gateway_timeout: config.payments.timeout,
                base_url: config.base_url.clone(),
            },
        );
        let auth = AuthService::new(Arc::clone(&stores.users), mailer, config.base_url.clone());
        let admin = AdminService::new(Arc::clone(&stores.books), Arc::clone(&stores.users));

        Self {
            inner: Arc::new(AppStateInner {
                pool: stores.pool().cloned(),
                config,
                catalog,
                orders,
                auth,
                admin,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// The database pool, when running on `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn admin(&self) -> &AdminService {
        &self.inner.admin
    }
}
