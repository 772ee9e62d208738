#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use folio_catalog::{Book, Cart, CartOwner, Coupon, DiscountType};
use folio_core::notify::{NotificationTransport, NotifyError};
use folio_core::payment::{GatewayError, GatewayRedirect, GatewayRequest, PaymentGateway};
use folio_core::repository::{CouponRedemption, CouponRepository, OrderRepository, OrderTransition, StoreError};
use folio_core::{Delivery, Order, OrderStatus, PaymentMethod};
use folio_order::{
    CartService, CheckoutRequest, Notifier, OrderCoordinator, OrderLifecycle, OrderNumberSource,
    PaymentOrchestrator, SandboxGateway,
};
use folio_store::{CheckoutSettings, MemoryStore};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Keeps every message instead of sending it
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

pub struct FailingTransport;

#[async_trait]
impl NotificationTransport for FailingTransport {
    async fn send(&self, _phone: &str, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("connection refused".to_string()))
    }
}

pub struct DownGateway;

#[async_trait]
impl PaymentGateway for DownGateway {
    async fn create_payment(&self, _request: &GatewayRequest) -> Result<GatewayRedirect, GatewayError> {
        Err(GatewayError::Unreachable("connect timeout".to_string()))
    }

    fn verify_callback(&self, _callback: &folio_core::payment::GatewayCallback) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Hands out a fixed sequence of order numbers
pub struct ScriptedNumbers(pub Mutex<VecDeque<String>>);

impl ScriptedNumbers {
    pub fn new(numbers: &[&str]) -> Self {
        Self(Mutex::new(numbers.iter().map(|n| n.to_string()).collect()))
    }
}

impl OrderNumberSource for ScriptedNumbers {
    fn next_number(&self, prefix: &str, _now: chrono::DateTime<Utc>) -> String {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("{}{}", prefix, Uuid::new_v4().simple()))
    }
}

/// Order repository that gives up the scheduler after every delivery read,
/// so calls joined together all finish reading before any of them writes.
pub struct InterleavedOrders(pub Arc<MemoryStore>);

#[async_trait]
impl OrderRepository for InterleavedOrders {
    async fn insert_order(&self, order: &Order, redemption: Option<&CouponRedemption>) -> Result<(), StoreError> {
        self.0.insert_order(order, redemption).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.0.get_order(id).await
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.0.get_order_by_number(order_number).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        self.0.list_orders(status).await
    }

    async fn get_delivery(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let delivery = self.0.get_delivery(order_id).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        delivery
    }

    async fn save_transition(&self, transition: &OrderTransition) -> Result<(), StoreError> {
        self.0.save_transition(transition).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub sms: Arc<RecordingTransport>,
    pub carts: CartService,
    pub coordinator: Arc<OrderCoordinator>,
    pub lifecycle: OrderLifecycle,
    pub payments: PaymentOrchestrator,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(CheckoutSettings::default(), Arc::new(SandboxGateway::new("http://localhost:8080")))
    }

    pub fn with(settings: CheckoutSettings, gateway: Arc<dyn PaymentGateway>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let sms = Arc::new(RecordingTransport::default());
        let notifier = Arc::new(Notifier::new(sms.clone(), store.clone()));
        let currency = settings.currency.clone();

        Self {
            carts: CartService::new(store.clone(), store.clone(), store.clone()),
            coordinator: Arc::new(OrderCoordinator::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                settings,
            )),
            lifecycle: OrderLifecycle::new(store.clone(), store.clone(), notifier.clone()),
            payments: PaymentOrchestrator::new(gateway.clone(), store.clone(), store.clone(), notifier, currency.clone()),
            gateway,
            currency,
            store,
            sms,
        }
    }

    /// Lifecycle over the same store whose reads interleave with each other
    pub fn interleaved_lifecycle(&self) -> OrderLifecycle {
        let notifier = Arc::new(Notifier::new(self.sms.clone(), self.store.clone()));
        OrderLifecycle::new(Arc::new(InterleavedOrders(self.store.clone())), self.store.clone(), notifier)
    }

    /// Payment orchestrator over the same store whose reads interleave with each other
    pub fn interleaved_payments(&self) -> PaymentOrchestrator {
        let notifier = Arc::new(Notifier::new(self.sms.clone(), self.store.clone()));
        PaymentOrchestrator::new(
            self.gateway.clone(),
            Arc::new(InterleavedOrders(self.store.clone())),
            self.store.clone(),
            notifier,
            self.currency.clone(),
        )
    }

    pub async fn book(&self, title: &str, cents: i64) -> Book {
        let book = Book {
            id: Uuid::new_v4(),
            title: title.to_string(),
            current_price: Decimal::new(cents, 2),
            stock: 10,
        };
        self.store.add_book(book.clone()).await;
        book
    }

    pub async fn coupon(&self, code: &str, discount_type: DiscountType, value: Decimal) -> Coupon {
        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            description: String::new(),
            discount_type,
            discount_value: value,
            min_purchase_amount: None,
            max_discount_amount: None,
            usage_limit: None,
            usage_limit_per_user: 1,
            usage_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            is_active: true,
            created_at: now,
        };
        self.store.save_coupon(&coupon).await.unwrap();
        coupon
    }

    /// Fill a fresh anonymous cart and return it
    pub async fn cart_with(&self, lines: &[(&Book, u32)]) -> Cart {
        let owner = CartOwner::Anonymous(Uuid::new_v4().to_string());
        for (book, qty) in lines {
            self.carts.add(&owner, book.id, *qty, false).await.unwrap();
        }
        self.carts.resolve(&owner, None).await.unwrap()
    }

    pub async fn place_order(&self, lines: &[(&Book, u32)]) -> Order {
        let cart = self.cart_with(lines).await;
        self.coordinator.checkout(cart, &request()).await.unwrap()
    }

    pub async fn reload(&self, order: &Order) -> Order {
        self.store.get_order(order.id).await.unwrap().unwrap()
    }
}

pub fn request() -> CheckoutRequest {
    CheckoutRequest {
        full_name: "Leyla Aliyeva".to_string(),
        email: "leyla@example.com".to_string(),
        phone: "+994501112233".to_string(),
        address: "28 May St 5".to_string(),
        city: "Baku".to_string(),
        postal_code: "AZ1000".to_string(),
        payment_method: PaymentMethod::Card,
        customer_notes: String::new(),
    }
}

pub fn dec(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
