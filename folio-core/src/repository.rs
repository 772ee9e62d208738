use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_catalog::{Cart, CartOwner, Coupon};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::delivery::{Courier, Delivery};
use crate::order::{Order, OrderStatus};
use crate::payment::{Payment, PaymentStatus};

/// Which uniqueness or limit rule a write ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    OrderNumber,
    TransactionId,
    CouponExhausted,
    CouponUserLimit,
    /// The row changed after it was read
    StaleState,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConflictKind::OrderNumber => "order number already taken",
            ConflictKind::TransactionId => "transaction id already recorded",
            ConflictKind::CouponExhausted => "coupon no longer valid",
            ConflictKind::CouponUserLimit => "coupon already used by this customer",
            ConflictKind::StaleState => "record changed concurrently",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(ConflictKind),
    #[error("Database error: {0}")]
    Database(String),
}

/// Coupon redemption written together with the order
#[derive(Debug, Clone, PartialEq)]
pub struct CouponRedemption {
    pub coupon_id: Uuid,
    pub user_id: Option<Uuid>,
    pub discount_amount: Decimal,
}

/// Order status plus the delivery row it implies, written atomically.
///
/// The write only goes through while the stored order still has
/// `expected_status` and the stored delivery still carries
/// `expected_delivery` as its `updated_at` (`None`: no delivery yet).
/// Otherwise it fails with `Conflict(StaleState)` and nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub expected_status: OrderStatus,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub delivery: Option<Delivery>,
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError>;

    /// Persist `cart` (items replaced wholesale) and delete `discard` in the same transaction.
    async fn save_cart(&self, cart: &Cart, discard: Option<Uuid>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Case-insensitive lookup
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError>;

    async fn save_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert order + items and redeem the coupon, all or nothing.
    ///
    /// Fails with `Conflict(OrderNumber)` on a duplicate number and with
    /// `Conflict(CouponExhausted | CouponUserLimit)` when the redemption would
    /// break a usage limit.
    async fn insert_order(
        &self,
        order: &Order,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    /// Newest first
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;

    async fn get_delivery(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn save_transition(&self, transition: &OrderTransition) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get_or_create_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<Payment, StoreError>;

    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>, StoreError>;

    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Payment outcome and (on success) the order transition, in one transaction.
    ///
    /// Fails with `Conflict(StaleState)` when the stored payment is no longer
    /// `expected` or the transition's guard does not hold.
    async fn save_reconciliation(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transition: Option<&OrderTransition>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CourierRepository: Send + Sync {
    async fn create_courier(&self, courier: &Courier) -> Result<(), StoreError>;

    async fn get_courier(&self, id: Uuid) -> Result<Option<Courier>, StoreError>;

    /// Active couriers first, then by name
    async fn list_couriers(&self, active_only: bool) -> Result<Vec<Courier>, StoreError>;

    async fn set_courier_active(&self, id: Uuid, is_active: bool) -> Result<(), StoreError>;
}
