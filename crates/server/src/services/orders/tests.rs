use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use bookstore_core::{Email, Isbn, UserRole};

use super::*;
use crate::db::{InMemoryStore, RepositoryError};
use crate::models::NewBook;
use crate::payments::PaymentGateway;

struct FakeGateway {
    method: PaymentMethod,
    initiate: Result<PaymentIntent, GatewayError>,
    verify: Mutex<Vec<Result<PaymentOutcome, GatewayError>>>,
}

impl FakeGateway {
    fn stripe(initiate: Result<PaymentIntent, GatewayError>) -> Self {
        Self {
            method: PaymentMethod::Stripe,
            initiate,
            verify: Mutex::new(Vec::new()),
        }
    }

    /// Answers verifications with `outcomes` in order, then `Pending`.
    fn with_outcomes(mut self, mut outcomes: Vec<Result<PaymentOutcome, GatewayError>>) -> Self {
        outcomes.reverse();
        self.verify = Mutex::new(outcomes);
        self
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        self.initiate.clone()
    }

    async fn verify(&self, _reference: &str) -> Result<PaymentOutcome, GatewayError> {
        self.verify
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Ok(PaymentOutcome::Pending))
    }
}

/// Order store whose inserts always fail.
struct BrokenOrders(InMemoryStore);

#[async_trait]
impl OrderRepository for BrokenOrders {
    async fn insert(&self, _order: &NewOrder) -> Result<Order, RepositoryError> {
        Err(RepositoryError::DataCorruption("disk full".to_owned()))
    }
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::get(&self.0, id).await
    }
    async fn list_for_user(
        &self,
        user_id: bookstore_core::UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        self.0.list_for_user(user_id).await
    }
    async fn attach_payment_intent(
        &self,
        id: OrderId,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.0.attach_payment_intent(id, method, reference).await
    }
    async fn settle(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        self.0.settle(id, status, reference).await
    }
    async fn claim_inventory_release(&self, id: OrderId) -> Result<bool, RepositoryError> {
        self.0.claim_inventory_release(id).await
    }
    async fn revert_inventory_release(&self, id: OrderId) -> Result<(), RepositoryError> {
        self.0.revert_inventory_release(id).await
    }
}

fn intent() -> PaymentIntent {
    PaymentIntent {
        provider_reference: "pi_1".to_owned(),
        redirect_url: None,
        client_secret: Some("secret".to_owned()),
    }
}

fn settings() -> OrderSettings {
    OrderSettings {
        currency: CurrencyCode::USD,
        gateway_timeout: Duration::from_secs(1),
        base_url: Url::parse("http://localhost:3000/").unwrap(),
    }
}

struct Fixture {
    store: InMemoryStore,
    buyer: CurrentUser,
    book: BookId,
}

async fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let user = UserRepository::create(
        &store,
        "Ada",
        &Email::parse("ada@example.com").unwrap(),
        "hash",
        UserRole::User,
    )
    .await
    .unwrap();
    let book = BookRepository::create(
        &store,
        &NewBook {
            title: "Things Fall Apart".to_owned(),
            author: "Chinua Achebe".to_owned(),
            published_date: NaiveDate::from_ymd_opt(1958, 6, 17).unwrap(),
            isbn: Isbn::parse("978-0385474542").unwrap(),
            price: Decimal::new(1999, 2),
            stock: 5,
            description: None,
        },
    )
    .await
    .unwrap();
    Fixture {
        store,
        buyer: CurrentUser {
            id: user.id,
            role: UserRole::User,
        },
        book: book.id,
    }
}

fn service(store: &InMemoryStore, orders: Arc<dyn OrderRepository>, gateway: FakeGateway) -> OrderService {
    OrderService::new(
        OrderStores {
            books: Arc::new(store.clone()),
            inventory: Arc::new(store.clone()),
            orders,
            users: Arc::new(store.clone()),
        },
        PaymentGateways::new().with(Arc::new(gateway)),
        settings(),
    )
}

fn checkout(book: BookId, quantity: i32, total: Decimal) -> PlaceOrder {
    PlaceOrder {
        items: vec![LineItem::new(book, quantity)],
        total_price: total,
        payment_method: PaymentMethod::Stripe,
    }
}

#[tokio::test]
async fn test_rejects_empty_and_non_positive_orders() {
    let f = fixture().await;
    let svc = service(&f.store, Arc::new(f.store.clone()), FakeGateway::stripe(Ok(intent())));

    let empty = PlaceOrder {
        items: Vec::new(),
        ..checkout(f.book, 1, Decimal::new(1999, 2))
    };
    assert!(matches!(
        svc.place_order(&f.buyer, empty).await,
        Err(OrderError::Validation(_))
    ));
    assert!(matches!(
        svc.place_order(&f.buyer, checkout(f.book, 0, Decimal::new(1999, 2)))
            .await,
        Err(OrderError::Validation(_))
    ));
    assert!(matches!(
        svc.place_order(&f.buyer, checkout(f.book, 1, Decimal::ZERO))
            .await,
        Err(OrderError::Validation(_))
    ));
    assert_eq!(f.store.stock_of(f.book).await, Some(5));
}

#[tokio::test]
async fn test_rejects_total_that_does_not_match_prices() {
    let f = fixture().await;
    let svc = service(&f.store, Arc::new(f.store.clone()), FakeGateway::stripe(Ok(intent())));

    let err = svc
        .place_order(&f.buyer, checkout(f.book, 2, Decimal::new(1999, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Validation(m) if m.contains("39.98")));
    assert_eq!(f.store.stock_of(f.book).await, Some(5));
}

#[tokio::test]
async fn test_rejects_unregistered_payment_method() {
    let f = fixture().await;
    let svc = service(&f.store, Arc::new(f.store.clone()), FakeGateway::stripe(Ok(intent())));

    let input = PlaceOrder {
        payment_method: PaymentMethod::Paystack,
        ..checkout(f.book, 1, Decimal::new(1999, 2))
    };
    assert!(matches!(
        svc.place_order(&f.buyer, input).await,
        Err(OrderError::Validation(_))
    ));
}

#[tokio::test]
async fn test_failed_insert_returns_reserved_stock() {
    let f = fixture().await;
    let svc = service(
        &f.store,
        Arc::new(BrokenOrders(f.store.clone())),
        FakeGateway::stripe(Ok(intent())),
    );

    let err = svc
        .place_order(&f.buyer, checkout(f.book, 2, Decimal::new(3998, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Repository(_)));
    assert_eq!(f.store.stock_of(f.book).await, Some(5));
}

#[tokio::test]
async fn test_initiate_requires_ownership() {
    let f = fixture().await;
    let svc = service(&f.store, Arc::new(f.store.clone()), FakeGateway::stripe(Ok(intent())));
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 1, Decimal::new(1999, 2)))
        .await
        .unwrap();

    let stranger = CurrentUser {
        id: bookstore_core::UserId::new(999),
        role: UserRole::Admin,
    };
    assert!(matches!(
        svc.initiate_payment(&stranger, order.id, None).await,
        Err(OrderError::Forbidden(_))
    ));
    // Staff may read but not pay for someone else's order.
    assert_eq!(svc.order(&stranger, order.id).await.unwrap().id, order.id);
}

#[tokio::test]
async fn test_declined_initiation_fails_order_and_returns_stock() {
    let f = fixture().await;
    let svc = service(
        &f.store,
        Arc::new(f.store.clone()),
        FakeGateway::stripe(Err(GatewayError::Declined("card declined".to_owned()))),
    );
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 2, Decimal::new(3998, 2)))
        .await
        .unwrap();
    assert_eq!(f.store.stock_of(f.book).await, Some(3));

    let err = svc
        .initiate_payment(&f.buyer, order.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::PaymentDeclined(_)));

    let order = svc.order(&f.buyer, order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert!(order.inventory_released);
    assert_eq!(f.store.stock_of(f.book).await, Some(5));
}

#[tokio::test]
async fn test_verify_rejects_foreign_reference() {
    let f = fixture().await;
    let svc = service(&f.store, Arc::new(f.store.clone()), FakeGateway::stripe(Ok(intent())));
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 1, Decimal::new(1999, 2)))
        .await
        .unwrap();

    assert!(matches!(
        svc.verify_payment(&f.buyer, order.id, "pi_1").await,
        Err(OrderError::Validation(_))
    ));

    svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();
    assert!(matches!(
        svc.verify_payment(&f.buyer, order.id, "pi_other").await,
        Err(OrderError::InvalidReference(_))
    ));
}

#[tokio::test]
async fn test_successful_verification_settles_once() {
    let f = fixture().await;
    let gateway = FakeGateway::stripe(Ok(intent())).with_outcomes(vec![
        Ok(PaymentOutcome::Succeeded),
        Ok(PaymentOutcome::Failed),
    ]);
    let svc = service(&f.store, Arc::new(f.store.clone()), gateway);
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 1, Decimal::new(1999, 2)))
        .await
        .unwrap();
    let (awaiting, _) = svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();
    assert_eq!(awaiting.payment_status, PaymentStatus::AwaitingPayment);

    let paid = svc.verify_payment(&f.buyer, order.id, "pi_1").await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);

    // A settled order is not re-verified, so the queued failure is never seen.
    let again = svc.verify_payment(&f.buyer, order.id, "pi_1").await.unwrap();
    assert_eq!(again.payment_status, PaymentStatus::Paid);
    assert_eq!(f.store.stock_of(f.book).await, Some(4));
}

#[tokio::test]
async fn test_gateway_outage_leaves_order_open() {
    let f = fixture().await;
    let gateway = FakeGateway::stripe(Ok(intent()))
        .with_outcomes(vec![Err(GatewayError::Unavailable("502".to_owned()))]);
    let svc = service(&f.store, Arc::new(f.store.clone()), gateway);
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 1, Decimal::new(1999, 2)))
        .await
        .unwrap();
    svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();

    assert!(matches!(
        svc.verify_payment(&f.buyer, order.id, "pi_1").await,
        Err(OrderError::GatewayUnavailable(_))
    ));
    let order = svc.order(&f.buyer, order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::AwaitingPayment);
    assert_eq!(f.store.stock_of(f.book).await, Some(4));
}

/// Gateway that hands out `pi_1`, `pi_2`, ... and holds each verification
/// until released, then reports `Failed`.
struct HeldVerification {
    issued: std::sync::atomic::AtomicUsize,
    entered: tokio::sync::Notify,
    proceed: tokio::sync::Notify,
}

#[async_trait]
impl PaymentGateway for HeldVerification {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        let n = self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            provider_reference: format!("pi_{n}"),
            redirect_url: None,
            client_secret: None,
        })
    }

    async fn verify(&self, _reference: &str) -> Result<PaymentOutcome, GatewayError> {
        self.entered.notify_one();
        self.proceed.notified().await;
        Ok(PaymentOutcome::Failed)
    }
}

#[tokio::test]
async fn test_outcome_for_superseded_reference_is_ignored() {
    let f = fixture().await;
    let gateway = Arc::new(HeldVerification {
        issued: std::sync::atomic::AtomicUsize::new(0),
        entered: tokio::sync::Notify::new(),
        proceed: tokio::sync::Notify::new(),
    });
    let svc = OrderService::new(
        OrderStores {
            books: Arc::new(f.store.clone()),
            inventory: Arc::new(f.store.clone()),
            orders: Arc::new(f.store.clone()),
            users: Arc::new(f.store.clone()),
        },
        PaymentGateways::new().with(Arc::clone(&gateway) as Arc<dyn PaymentGateway>),
        settings(),
    );
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 1, Decimal::new(1999, 2)))
        .await
        .unwrap();
    svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();

    let stale = {
        let svc = svc.clone();
        let buyer = f.buyer;
        let order_id = order.id;
        tokio::spawn(async move { svc.verify_payment(&buyer, order_id, "pi_1").await })
    };
    gateway.entered.notified().await;

    // The customer retries checkout while the first answer is in flight.
    let (retried, _) = svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();
    assert_eq!(retried.provider_reference.as_deref(), Some("pi_2"));
    gateway.proceed.notify_one();

    let order = stale.await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::AwaitingPayment);
    assert_eq!(order.provider_reference.as_deref(), Some("pi_2"));
    assert!(!order.inventory_released);
    assert_eq!(f.store.stock_of(f.book).await, Some(4));
}

/// Ledger whose first `release` fails.
struct FlakyRelease {
    inner: InMemoryStore,
    failures: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl InventoryLedger for FlakyRelease {
    async fn reserve(&self, items: &[LineItem]) -> Result<(), crate::db::ReservationError> {
        self.inner.reserve(items).await
    }

    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
        let failing = self
            .failures
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| n.checked_sub(1),
            )
            .is_ok();
        if failing {
            return Err(RepositoryError::DataCorruption("connection reset".to_owned()));
        }
        self.inner.release(items).await
    }
}

#[tokio::test]
async fn test_failed_release_is_retried_by_next_verification() {
    let f = fixture().await;
    let gateway = FakeGateway::stripe(Ok(intent()))
        .with_outcomes(vec![Ok(PaymentOutcome::Failed)]);
    let svc = OrderService::new(
        OrderStores {
            books: Arc::new(f.store.clone()),
            inventory: Arc::new(FlakyRelease {
                inner: f.store.clone(),
                failures: std::sync::atomic::AtomicUsize::new(1),
            }),
            orders: Arc::new(f.store.clone()),
            users: Arc::new(f.store.clone()),
        },
        PaymentGateways::new().with(Arc::new(gateway)),
        settings(),
    );
    let order = svc
        .place_order(&f.buyer, checkout(f.book, 2, Decimal::new(3998, 2)))
        .await
        .unwrap();
    svc.initiate_payment(&f.buyer, order.id, None).await.unwrap();
    assert_eq!(f.store.stock_of(f.book).await, Some(3));

    assert!(matches!(
        svc.verify_payment(&f.buyer, order.id, "pi_1").await,
        Err(OrderError::Repository(_))
    ));
    let failed = svc.order(&f.buyer, order.id).await.unwrap();
    assert_eq!(failed.payment_status, PaymentStatus::Failed);
    assert!(!failed.inventory_released);
    assert_eq!(f.store.stock_of(f.book).await, Some(3));

    let retried = svc.verify_payment(&f.buyer, order.id, "pi_1").await.unwrap();
    assert_eq!(retried.payment_status, PaymentStatus::Failed);
    assert!(retried.inventory_released);
    assert_eq!(f.store.stock_of(f.book).await, Some(5));

    svc.verify_payment(&f.buyer, order.id, "pi_1").await.unwrap();
    assert_eq!(f.store.stock_of(f.book).await, Some(5));
}

#[test]
fn test_return_url_keeps_base_path() {
    let store = InMemoryStore::new();
    let stores = OrderStores {
        books: Arc::new(store.clone()),
        inventory: Arc::new(store.clone()),
        orders: Arc::new(store.clone()),
        users: Arc::new(store),
    };
    let cases = [
        ("https://books.example.org/shop", "https://books.example.org/shop/orders/7/payment"),
        ("https://books.example.org/shop/", "https://books.example.org/shop/orders/7/payment"),
        ("http://localhost:3000", "http://localhost:3000/orders/7/payment"),
    ];
    for (base, expected) in cases {
        let service = OrderService::new(
            stores.clone(),
            PaymentGateways::new(),
            OrderSettings {
                base_url: Url::parse(base).unwrap(),
                ..settings()
            },
        );
        assert_eq!(service.return_url(OrderId::new(7)).unwrap().as_str(), expected);
    }
}
