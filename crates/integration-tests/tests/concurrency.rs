//! Concurrent checkouts and verifications.
//!
//! Many tasks race for the same copies; stock must never go negative and
//! every copy must be accounted for by exactly one successful order.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use bookstore_core::{PaymentMethod, PaymentStatus};
use bookstore_integration_tests::{ScriptedGateway, TestShop, checkout};
use bookstore_server::payments::PaymentOutcome;
use bookstore_server::services::OrderError;
use rust_decimal::Decimal;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(ScriptedGateway::new(PaymentMethod::Stripe)));
    let customer = shop.customer;
    let novel = shop.novel;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let orders = orders.clone();
        tasks.spawn(async move {
            orders
                .place_order(&customer, checkout(&[(novel, 1)], Decimal::new(1999, 2)))
                .await
        });
    }

    let mut placed = 0;
    let mut sold_out = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => placed += 1,
            Err(OrderError::InsufficientStock { .. }) => sold_out += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(sold_out, 15);
    assert_eq!(shop.stock(novel).await, 0);
    assert_eq!(orders.orders_for_user(&customer).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_multi_book_orders_stay_consistent() {
    let shop = TestShop::new().await;
    let orders = shop.orders(Arc::new(ScriptedGateway::new(PaymentMethod::Stripe)));
    let customer = shop.customer;
    let (novel, poems) = (shop.novel, shop.poems);

    // Each order wants one of each; poems (2 copies) is the bottleneck.
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let orders = orders.clone();
        tasks.spawn(async move {
            orders
                .place_order(
                    &customer,
                    checkout(&[(novel, 1), (poems, 1)], Decimal::new(3249, 2)),
                )
                .await
        });
    }

    let mut placed = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().is_ok() {
            placed += 1;
        }
    }

    assert_eq!(placed, 2);
    assert_eq!(shop.stock(poems).await, 0);
    assert_eq!(shop.stock(novel).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_verifications_release_once() {
    let shop = TestShop::new().await;
    let outcomes = (0..6).map(|_| Ok(PaymentOutcome::Failed)).collect();
    let gateway =
        Arc::new(ScriptedGateway::new(PaymentMethod::Stripe).with_outcomes(outcomes));
    let orders = shop.orders(gateway);
    let customer = shop.customer;

    let order = orders
        .place_order(&customer, checkout(&[(shop.novel, 4)], Decimal::new(7996, 2)))
        .await
        .unwrap();
    let (order, intent) = orders
        .initiate_payment(&customer, order.id, None)
        .await
        .unwrap();
    assert_eq!(shop.stock(shop.novel).await, 1);
    let order_id = order.id;

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let orders = orders.clone();
        let reference = intent.provider_reference.clone();
        tasks.spawn(async move { orders.verify_payment(&customer, order_id, &reference).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap().payment_status, PaymentStatus::Failed);
    }

    assert_eq!(shop.stock(shop.novel).await, 5);
}
