pub mod order;
pub mod delivery;
pub mod payment;
pub mod notify;
pub mod repository;

use folio_catalog::{CartError, CatalogError, CouponError};
use repository::StoreError;

pub use delivery::{Courier, Delivery, DeliveryStatus};
pub use order::{CustomerInfo, Order, OrderItem, OrderStatus, PaymentMethod};
pub use payment::{Payment, PaymentStatus};

/// Reason codes attached to rejected operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyCart,
    InvalidQuantity,
    InvalidCoupon,
    InvalidCustomer,
    InvalidStatus,
    InvalidTransition,
    OrderNotPayable,
    InactiveCourier,
    InvalidSignature,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::EmptyCart => "empty_cart",
            RejectReason::InvalidQuantity => "invalid_quantity",
            RejectReason::InvalidCoupon => "invalid_coupon",
            RejectReason::InvalidCustomer => "invalid_customer",
            RejectReason::InvalidStatus => "invalid_status",
            RejectReason::InvalidTransition => "invalid_transition",
            RejectReason::OrderNotPayable => "order_not_payable",
            RejectReason::InactiveCourier => "inactive_courier",
            RejectReason::InvalidSignature => "invalid_signature",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed [{reason}]: {detail}")]
    ValidationError { reason: RejectReason, detail: String },
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("External service error: {0}")]
    ExternalServiceError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        CoreError::ValidationError { reason, detail: detail.into() }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CoreError::NotFoundError(what),
            StoreError::Conflict(kind) => CoreError::ConflictError(kind.to_string()),
            StoreError::Database(msg) => CoreError::InternalError(msg),
        }
    }
}

impl From<CatalogError> for CoreError {
    fn from(err: CatalogError) -> Self {
        CoreError::ExternalServiceError(err.to_string())
    }
}

impl From<CartError> for CoreError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InvalidQuantity(_) | CartError::QuantityTooLarge(_) => {
                CoreError::rejected(RejectReason::InvalidQuantity, err.to_string())
            }
            CartError::BookMissing(_) => CoreError::NotFoundError(err.to_string()),
        }
    }
}

impl From<CouponError> for CoreError {
    fn from(err: CouponError) -> Self {
        CoreError::rejected(RejectReason::InvalidCoupon, err.to_string())
    }
}

impl From<payment::GatewayError> for CoreError {
    fn from(err: payment::GatewayError) -> Self {
        match err {
            payment::GatewayError::InvalidSignature => {
                CoreError::rejected(RejectReason::InvalidSignature, err.to_string())
            }
            other => CoreError::ExternalServiceError(other.to_string()),
        }
    }
}
