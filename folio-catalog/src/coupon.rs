use chrono::{DateTime, Utc};
use folio_shared::round_money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Fixed,
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Fixed => "fixed",
            DiscountType::Percentage => "percentage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fixed" => Some(DiscountType::Fixed),
            "percentage" => Some(DiscountType::Percentage),
            _ => None,
        }
    }
}

/// Discount coupon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    /// Unique, matched case-insensitively
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_limit_per_user: i32,
    pub usage_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Canonical form used for lookups and uniqueness.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.usage_count >= limit)
    }
}

/// Computes discounts. Never mutates the coupon; redemption is counted by checkout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CouponEvaluator;

impl CouponEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Discount for `cart_total`, or zero when the coupon does not apply.
    pub fn evaluate(&self, coupon: Option<&Coupon>, cart_total: Decimal, now: DateTime<Utc>) -> Decimal {
        let Some(coupon) = coupon else {
            return Decimal::ZERO;
        };

        if !coupon.is_active || !coupon.is_within_window(now) {
            return Decimal::ZERO;
        }

        if matches!(coupon.min_purchase_amount, Some(min) if cart_total < min) {
            return Decimal::ZERO;
        }

        let discount = match coupon.discount_type {
            DiscountType::Fixed => coupon.discount_value.min(cart_total),
            DiscountType::Percentage => {
                let raw = cart_total * coupon.discount_value / Decimal::ONE_HUNDRED;
                match coupon.max_discount_amount {
                    Some(cap) => raw.min(cap).min(cart_total),
                    None => raw.min(cart_total),
                }
            }
        };

        round_money(discount.max(Decimal::ZERO))
    }

    /// Whether a code may be attached to a cart right now.
    pub fn validate(&self, coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !coupon.is_active {
            return Err(CouponError::Inactive(coupon.code.clone()));
        }
        if !coupon.is_within_window(now) {
            return Err(CouponError::OutsideWindow(coupon.code.clone()));
        }
        if coupon.is_exhausted() {
            return Err(CouponError::Exhausted(coupon.code.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon {0} is not active")]
    Inactive(String),

    #[error("Coupon {0} is outside its validity window")]
    OutsideWindow(String),

    #[error("Coupon {0} has reached its usage limit")]
    Exhausted(String),
}
