//! Order and payment lifecycle against the in-memory store.
//!
//! Covers the round trip from checkout to settlement, the failure paths
//! that must hand reserved stock back exactly once, and provider outages.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use bookstore_core::{PaymentMethod, PaymentStatus};
use bookstore_integration_tests::{ScriptedGateway, TestShop, checkout};
use bookstore_server::payments::{GatewayError, PaymentOutcome};
use bookstore_server::services::OrderError;
use rust_decimal::Decimal;

fn stripe() -> ScriptedGateway {
    ScriptedGateway::new(PaymentMethod::Stripe)
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_checkout_to_paid() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(stripe().with_outcomes(vec![Ok(PaymentOutcome::Succeeded)]));
    let orders = shop.orders(Arc::clone(&gateway));

    // 2 x 19.99 + 1 x 12.50
    let order = orders
        .place_order(
            &shop.customer,
            checkout(&[(shop.novel, 2), (shop.poems, 1)], Decimal::new(5248, 2)),
        )
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(shop.stock(shop.novel).await, 3);
    assert_eq!(shop.stock(shop.poems).await, 1);

    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::AwaitingPayment);
    assert_eq!(order.provider_reference.as_deref(), Some("ref_1"));
    assert!(intent.redirect_url.is_some());

    let order = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(!order.inventory_released);
    assert_eq!(shop.stock(shop.novel).await, 3);

    let listed = orders.orders_for_user(&shop.customer).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, order.id);
}

#[tokio::test]
async fn test_duplicate_lines_are_merged() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(stripe()));

    let order = orders
        .place_order(
            &shop.customer,
            checkout(&[(shop.novel, 1), (shop.novel, 2)], Decimal::new(5997, 2)),
        )
        .await
        .unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 3);
    assert_eq!(shop.stock(shop.novel).await, 2);
}

// =============================================================================
// Reservation
// =============================================================================

#[tokio::test]
async fn test_reservation_is_all_or_nothing() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(stripe()));

    // The novel line fits, the poems line does not.
    let result = orders
        .place_order(
            &shop.customer,
            checkout(&[(shop.novel, 1), (shop.poems, 3)], Decimal::new(5749, 2)),
        )
        .await;

    assert!(matches!(
        result,
        Err(OrderError::InsufficientStock { book_id, requested: 3 }) if book_id == shop.poems
    ));
    assert_eq!(shop.stock(shop.novel).await, 5);
    assert_eq!(shop.stock(shop.poems).await, 2);
    assert!(orders.orders_for_user(&shop.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_book_reserves_nothing() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(stripe()));
    let missing = bookstore_core::BookId::from(9_999);

    let result = orders
        .place_order(
            &shop.customer,
            checkout(&[(shop.novel, 1), (missing, 1)], Decimal::new(1999, 2)),
        )
        .await;

    assert!(matches!(
        result,
        Err(OrderError::BookNotFound(id)) if id == missing
    ));
    assert_eq!(shop.stock(shop.novel).await, 5);
}

// =============================================================================
// Idempotent verification
// =============================================================================

#[tokio::test]
async fn test_repeated_verification_settles_once() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(stripe().with_outcomes(vec![
        Ok(PaymentOutcome::Succeeded),
        Ok(PaymentOutcome::Failed),
    ]));
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 1)], Decimal::new(1999, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    let first = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();
    let second = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();

    assert_eq!(first.payment_status, PaymentStatus::Paid);
    assert_eq!(second.payment_status, PaymentStatus::Paid);
    // The settled order is answered without asking the provider again.
    assert_eq!(gateway.verify_calls(), 1);
    assert_eq!(shop.stock(shop.novel).await, 4);
}

#[tokio::test]
async fn test_pending_outcome_leaves_order_waiting() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(stripe());
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 2)], Decimal::new(3998, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    let order = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();

    assert_eq!(order.payment_status, PaymentStatus::AwaitingPayment);
    assert_eq!(shop.stock(shop.novel).await, 3);
}

// =============================================================================
// Compensation
// =============================================================================

#[tokio::test]
async fn test_failed_payment_returns_stock_once() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(stripe().with_outcomes(vec![Ok(PaymentOutcome::Failed)]));
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.poems, 2)], Decimal::new(2500, 2)))
        .await
        .unwrap();
    assert_eq!(shop.stock(shop.poems).await, 0);
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    let failed = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();
    assert_eq!(failed.payment_status, PaymentStatus::Failed);
    assert!(failed.inventory_released);
    assert_eq!(shop.stock(shop.poems).await, 2);

    let again = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();
    assert_eq!(again.payment_status, PaymentStatus::Failed);
    assert_eq!(shop.stock(shop.poems).await, 2);
}

#[tokio::test]
async fn test_decline_during_verification_fails_order() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(
        stripe().with_outcomes(vec![Err(GatewayError::Declined("card expired".to_owned()))]),
    );
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 1)], Decimal::new(1999, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    let result = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await;
    assert!(matches!(result, Err(OrderError::PaymentDeclined(m)) if m == "card expired"));

    let order = orders.order(&shop.customer, order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(shop.stock(shop.novel).await, 5);
}

#[tokio::test]
async fn test_declined_initiation_fails_order() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(stripe().declining("do not honor")));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 3)], Decimal::new(5997, 2)))
        .await
        .unwrap();
    let result = orders.initiate_payment(&shop.customer, order.id, None).await;

    assert!(matches!(result, Err(OrderError::PaymentDeclined(_))));
    let order = orders.order(&shop.customer, order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(shop.stock(shop.novel).await, 5);

    // A failed order cannot be paid again.
    assert!(matches!(
        orders.initiate_payment(&shop.customer, order.id, None).await,
        Err(OrderError::Validation(_))
    ));
}

// =============================================================================
// Provider outages
// =============================================================================

#[tokio::test]
async fn test_slow_provider_times_out_without_settling() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(
        stripe()
            .with_outcomes(vec![Ok(PaymentOutcome::Succeeded)])
            .with_delay(Duration::from_secs(2)),
    );
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 1)], Decimal::new(1999, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    let result = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await;

    assert!(matches!(result, Err(OrderError::GatewayUnavailable(_))));
    let order = orders.order(&shop.customer, order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::AwaitingPayment);
    assert!(!order.inventory_released);
    assert_eq!(shop.stock(shop.novel).await, 4);
}

#[tokio::test]
async fn test_outage_then_retry_settles() {
    let shop = TestShop::new().await;
    let gateway = Arc::new(stripe().with_outcomes(vec![
        Err(GatewayError::Unavailable("503 from provider".to_owned())),
        Ok(PaymentOutcome::Succeeded),
    ]));
    let orders = shop.orders(Arc::clone(&gateway));

    let order = orders
        .place_order(&shop.customer, checkout(&[(shop.novel, 1)], Decimal::new(1999, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&shop.customer, order.id, None)
        .await
        .unwrap();

    assert!(matches!(
        orders
            .verify_payment(&shop.customer, order.id, &intent.provider_reference)
            .await,
        Err(OrderError::GatewayUnavailable(_))
    ));
    let order = orders
        .verify_payment(&shop.customer, order.id, &intent.provider_reference)
        .await
        .unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(gateway.verify_calls(), 2);
}
