//! Order/payment orchestrator.
//!
//! Drives an order through its payment state machine:
//!
//! ```text
//! place_order ──► Pending ──initiate_payment──► AwaitingPayment ──verify_payment──► Paid
//!                    │                               │    ▲
//!                    │                               └────┘ (Pending outcome, new intent)
//!                    └───────────(declined / failed)──────────────────────────────► Failed
//! ```
//!
//! Stock is reserved before the order exists and returned exactly once if the
//! order fails. Terminal transitions are conditional writes in the store; only
//! the caller whose write lands performs side effects.

mod error;
#[cfg(test)]
mod tests;

pub use error::OrderError;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use url::Url;

use bookstore_core::{BookId, CurrencyCode, OrderId, PaymentMethod, PaymentStatus, Price};

use crate::db::{BookRepository, InventoryLedger, OrderRepository, UserRepository};
use crate::models::{CurrentUser, LineItem, NewOrder, Order};
use crate::payments::{
    GatewayError, PaymentGateways, PaymentIntent, PaymentOutcome, PaymentRequest,
};

/// Checkout request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    #[serde(alias = "books")]
    pub items: Vec<LineItem>,
    /// Total the client expects to pay. Must match current catalog prices.
    pub total_price: Decimal,
    pub payment_method: PaymentMethod,
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    /// Currency every order is charged in.
    pub currency: CurrencyCode,
    /// Upper bound on a single provider call.
    pub gateway_timeout: Duration,
    /// Public base URL; provider return URLs are built from it.
    pub base_url: Url,
}

/// Storage handles used by the orchestrator.
#[derive(Clone)]
pub struct OrderStores {
    pub books: Arc<dyn BookRepository>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
}

/// Order/payment orchestrator.
#[derive(Clone)]
pub struct OrderService {
    stores: OrderStores,
    gateways: PaymentGateways,
    settings: OrderSettings,
}

impl OrderService {
    /// Create a new orchestrator.
    #[must_use]
    pub const fn new(stores: OrderStores, gateways: PaymentGateways, settings: OrderSettings) -> Self {
        Self {
            stores,
            gateways,
            settings,
        }
    }

    /// Reserve stock and create an order in `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for empty orders, non-positive
    /// quantities or totals, unavailable payment methods and totals that do
    /// not match catalog prices. Returns `OrderError::InsufficientStock` or
    /// `OrderError::BookNotFound` if the reservation fails; nothing is
    /// reserved and no order is created in that case.
    #[instrument(skip(self, input), fields(user_id = %principal.id, method = %input.payment_method))]
    pub async fn place_order(
        &self,
        principal: &CurrentUser,
        input: PlaceOrder,
    ) -> Result<Order, OrderError> {
        validate_order(&input)?;
        if !self.gateways.supports(input.payment_method) {
            return Err(OrderError::Validation(format!(
                "payment method {} is not available",
                input.payment_method
            )));
        }

        let items = LineItem::consolidate(&input.items);
        let expected = self.catalog_total(&items).await?;
        if input.total_price.round_dp(2) != expected.round_dp(2) {
            return Err(OrderError::Validation(format!(
                "total price {} does not match current prices ({})",
                input.total_price.round_dp(2),
                expected.round_dp(2)
            )));
        }

        self.stores.inventory.reserve(&items).await?;

        let new_order = NewOrder {
            user_id: principal.id,
            items,
            total_price: expected.round_dp(2),
            payment_method: input.payment_method,
        };
        match self.stores.orders.insert(&new_order).await {
            Ok(order) => {
                info!(order_id = %order.id, total = %order.total_price, "order placed");
                Ok(order)
            }
            Err(e) => {
                error!(error = %e, "failed to persist order, returning reserved stock");
                if let Err(release_err) = self.stores.inventory.release(&new_order.items).await {
                    error!(error = %release_err, items = ?new_order.items, "failed to return reserved stock");
                }
                Err(e.into())
            }
        }
    }

    /// Create a provider intent for an open order and move it to
    /// `AwaitingPayment`.
    ///
    /// Calling this again before verification creates a fresh intent; the
    /// previous one is abandoned. `method` overrides the order's method.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` / `OrderError::Forbidden` unless the
    /// caller owns the order, `OrderError::Validation` if the order is already
    /// settled or the method is unavailable, `OrderError::GatewayUnavailable`
    /// on provider failures or timeouts (order unchanged) and
    /// `OrderError::PaymentDeclined` if the provider refuses (order `Failed`,
    /// stock returned).
    #[instrument(skip(self), fields(user_id = %principal.id))]
    pub async fn initiate_payment(
        &self,
        principal: &CurrentUser,
        order_id: OrderId,
        method: Option<PaymentMethod>,
    ) -> Result<(Order, PaymentIntent), OrderError> {
        let order = self.owned_order(principal, order_id).await?;
        if order.is_terminal() {
            return Err(OrderError::Validation(format!(
                "order {order_id} is already {}",
                order.payment_status
            )));
        }

        let method = method.unwrap_or(order.payment_method);
        let gateway = self.gateways.get(method).ok_or_else(|| {
            OrderError::Validation(format!("payment method {method} is not available"))
        })?;
        let user = self
            .stores
            .users
            .get_by_id(principal.id)
            .await?
            .ok_or_else(|| OrderError::Validation("account no longer exists".to_owned()))?;

        let request = PaymentRequest {
            order_id,
            amount: Price::new(order.total_price, self.settings.currency),
            email: user.email,
            return_url: self.return_url(order_id)?,
        };

        match self.call_gateway(gateway.initiate(&request)).await {
            Ok(intent) => {
                let order = self
                    .stores
                    .orders
                    .attach_payment_intent(order_id, method, &intent.provider_reference)
                    .await?
                    .ok_or_else(|| {
                        OrderError::Validation(format!("order {order_id} was settled meanwhile"))
                    })?;
                info!(order_id = %order_id, %method, reference = %intent.provider_reference, "payment initiated");
                Ok((order, intent))
            }
            Err(GatewayError::Declined(message)) => {
                warn!(order_id = %order_id, %method, %message, "provider declined payment");
                self.fail_order(order_id, order.provider_reference.as_deref())
                    .await?;
                Err(OrderError::PaymentDeclined(message))
            }
            Err(e) => {
                warn!(order_id = %order_id, %method, error = %e, "payment initiation failed");
                Err(e.into())
            }
        }
    }

    /// Ask the provider how the order's payment ended and settle the order.
    ///
    /// Settled orders are returned as they are without calling the provider.
    /// A `Pending` outcome leaves the order untouched.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidReference` if `reference` is not the
    /// order's current provider reference, `OrderError::GatewayUnavailable`
    /// on provider failures or timeouts (order unchanged, retry later) and
    /// `OrderError::PaymentDeclined` if the provider reports a decline (order
    /// `Failed`, stock returned).
    #[instrument(skip(self), fields(user_id = %principal.id))]
    pub async fn verify_payment(
        &self,
        principal: &CurrentUser,
        order_id: OrderId,
        reference: &str,
    ) -> Result<Order, OrderError> {
        let order = self.visible_order(principal, order_id).await?;

        if order.is_terminal() {
            if order.needs_inventory_release() {
                self.release_once(&order).await?;
                return self.load(order_id).await;
            }
            return Ok(order);
        }

        let stored = order.provider_reference.as_deref().ok_or_else(|| {
            OrderError::Validation(format!("payment for order {order_id} was not initiated"))
        })?;
        if stored != reference {
            return Err(OrderError::InvalidReference(format!(
                "reference does not belong to order {order_id}"
            )));
        }

        let gateway = self.gateways.get(order.payment_method).ok_or_else(|| {
            OrderError::GatewayUnavailable(format!("{} is not configured", order.payment_method))
        })?;

        match self.call_gateway(gateway.verify(reference)).await {
            Ok(PaymentOutcome::Succeeded) => self.mark_paid(order_id, reference).await,
            Ok(PaymentOutcome::Failed) => {
                info!(order_id = %order_id, "provider reported payment failure");
                self.fail_order(order_id, Some(reference)).await
            }
            Ok(PaymentOutcome::Pending) => Ok(order),
            Err(GatewayError::Declined(message)) => {
                warn!(order_id = %order_id, %message, "provider declined payment");
                let order = self.fail_order(order_id, Some(reference)).await?;
                if order.payment_status == PaymentStatus::Failed {
                    return Err(OrderError::PaymentDeclined(message));
                }
                Ok(order)
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "payment verification failed");
                Err(e.into())
            }
        }
    }

    /// One order. Owners and staff may read it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` or `OrderError::Forbidden`.
    pub async fn order(&self, principal: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        self.visible_order(principal, id).await
    }

    /// The caller's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn orders_for_user(&self, principal: &CurrentUser) -> Result<Vec<Order>, OrderError> {
        Ok(self.stores.orders.list_for_user(principal.id).await?)
    }

    async fn catalog_total(&self, items: &[LineItem]) -> Result<Decimal, OrderError> {
        let ids: Vec<BookId> = items.iter().map(|i| i.book_id).collect();
        let books = self.stores.books.get_many(&ids).await?;

        let mut total = Decimal::ZERO;
        for item in items {
            let book = books
                .iter()
                .find(|b| b.id == item.book_id)
                .ok_or(OrderError::BookNotFound(item.book_id))?;
            total = book
                .price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| OrderError::Validation("order total is too large".to_owned()))?;
        }
        if total <= Decimal::ZERO {
            return Err(OrderError::Validation(
                "order total must be positive".to_owned(),
            ));
        }
        Ok(total)
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.settings.gateway_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Unavailable(format!(
                    "no answer within {}s",
                    self.settings.gateway_timeout.as_secs_f32()
                )))
            })
    }

    async fn mark_paid(&self, order_id: OrderId, reference: &str) -> Result<Order, OrderError> {
        if let Some(order) = self
            .stores
            .orders
            .settle(order_id, PaymentStatus::Paid, Some(reference))
            .await?
        {
            info!(order_id = %order_id, "order paid");
            return Ok(order);
        }
        self.settled_elsewhere(order_id, reference).await
    }

    /// Move the order to `Failed` and return its stock, once.
    ///
    /// Nothing changes unless the order still carries `reference`.
    async fn fail_order(
        &self,
        order_id: OrderId,
        reference: Option<&str>,
    ) -> Result<Order, OrderError> {
        let order = match self
            .stores
            .orders
            .settle(order_id, PaymentStatus::Failed, reference)
            .await?
        {
            Some(order) => {
                info!(order_id = %order_id, "order failed");
                order
            }
            None => self.settled_elsewhere(order_id, reference.unwrap_or("none")).await?,
        };

        if order.needs_inventory_release() {
            self.release_once(&order).await?;
            return self.load(order_id).await;
        }
        Ok(order)
    }

    /// Return a failed order's stock unless another caller already did.
    async fn release_once(&self, order: &Order) -> Result<(), OrderError> {
        if !self.stores.orders.claim_inventory_release(order.id).await? {
            return Ok(());
        }

        if let Err(e) = self.stores.inventory.release(&order.items).await {
            error!(order_id = %order.id, error = %e, "failed to return stock of failed order");
            if let Err(revert) = self.stores.orders.revert_inventory_release(order.id).await {
                error!(order_id = %order.id, error = %revert, "failed to reopen stock release");
            }
            return Err(e.into());
        }

        info!(order_id = %order.id, lines = order.items.len(), "stock returned");
        Ok(())
    }

    /// The order after a lost settle: another verification finished first or
    /// the order was re-initiated under a new reference.
    async fn settled_elsewhere(&self, order_id: OrderId, reference: &str) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_terminal() {
            warn!(
                order_id = %order_id,
                %reference,
                current = ?order.provider_reference,
                "outcome for a superseded payment reference ignored"
            );
        }
        Ok(order)
    }

    async fn load(&self, id: OrderId) -> Result<Order, OrderError> {
        self.stores
            .orders
            .get(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))
    }

    async fn owned_order(&self, principal: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self.load(id).await?;
        if order.user_id != principal.id {
            return Err(OrderError::Forbidden(id));
        }
        Ok(order)
    }

    async fn visible_order(
        &self,
        principal: &CurrentUser,
        id: OrderId,
    ) -> Result<Order, OrderError> {
        let order = self.load(id).await?;
        if order.user_id != principal.id && !principal.is_staff() {
            return Err(OrderError::Forbidden(id));
        }
        Ok(order)
    }

    /// `{base_url}/orders/{id}/payment`, keeping any path prefix of the base.
    fn return_url(&self, order_id: OrderId) -> Result<Url, OrderError> {
        let mut url = self.settings.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                OrderError::Validation("invalid return URL: base cannot hold a path".to_owned())
            })?
            .pop_if_empty()
            .extend(["orders", &order_id.to_string(), "payment"]);
        Ok(url)
    }
}

fn validate_order(input: &PlaceOrder) -> Result<(), OrderError> {
    if input.items.is_empty() {
        return Err(OrderError::Validation(
            "order must contain at least one book".to_owned(),
        ));
    }
    if let Some(item) = input.items.iter().find(|i| i.quantity <= 0) {
        return Err(OrderError::Validation(format!(
            "quantity for book {} must be positive",
            item.book_id
        )));
    }
    if input.total_price <= Decimal::ZERO {
        return Err(OrderError::Validation(
            "total price must be positive".to_owned(),
        ));
    }
    Ok(())
}
