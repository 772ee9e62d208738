use chrono::{DateTime, Utc};
use folio_catalog::{Cart, CatalogService, Coupon, CouponEvaluator, PricedLine};
use folio_core::repository::{CartRepository, ConflictKind, CouponRedemption, CouponRepository, OrderRepository, StoreError};
use folio_core::{
    CoreError, CoreResult, CustomerInfo, Order, OrderItem, OrderStatus, PaymentMethod, RejectReason,
};
use folio_shared::round_money;
use folio_store::CheckoutSettings;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::numbering::{OrderNumberSource, TimestampNumbers};

/// Shipping and contact details submitted at checkout
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub customer_notes: String,
}

impl CheckoutRequest {
    fn validate(&self) -> CoreResult<()> {
        let required = [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("address", &self.address),
            ("city", &self.city),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CoreError::rejected(
                RejectReason::InvalidCustomer,
                format!("{} is required", field),
            ));
        }
        Ok(())
    }

    fn customer(&self, user_id: Option<Uuid>) -> CustomerInfo {
        CustomerInfo {
            user_id,
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
        }
    }
}

/// Pricing of a cart at checkout time
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
}

impl Quote {
    pub fn total(&self) -> Decimal {
        round_money(self.subtotal - self.discount + self.shipping_cost)
    }
}

/// Turns a cart into a persisted order
pub struct OrderCoordinator {
    catalog: Arc<dyn CatalogService>,
    coupons: Arc<dyn CouponRepository>,
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    settings: CheckoutSettings,
    numbers: Arc<dyn OrderNumberSource>,
    evaluator: CouponEvaluator,
}

impl OrderCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        coupons: Arc<dyn CouponRepository>,
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            coupons,
            orders,
            carts,
            settings,
            numbers: Arc::new(TimestampNumbers),
            evaluator: CouponEvaluator::new(),
        }
    }

    pub fn with_number_source(mut self, numbers: Arc<dyn OrderNumberSource>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Price `cart` against the live catalog.
    pub async fn quote(&self, cart: &Cart, coupon: Option<&Coupon>, now: DateTime<Utc>) -> CoreResult<Quote> {
        let books = self.catalog.get_books(&cart.book_ids()).await?;
        let lines = cart.price(&books)?;
        let subtotal = round_money(PricedLine::subtotal(&lines));
        let discount = self.evaluator.evaluate(coupon, subtotal, now);

        Ok(Quote {
            lines,
            subtotal,
            discount,
            shipping_cost: round_money(self.settings.shipping_cost),
        })
    }

    /// Snapshot `cart` into a pending order, redeeming `coupon` when it yields a discount.
    ///
    /// The order, its items and the coupon redemption are written together.
    /// A coupon that runs out while committing is dropped and the order is
    /// placed at full price.
    pub async fn create_order(
        &self,
        request: &CheckoutRequest,
        cart: &Cart,
        coupon: Option<&Coupon>,
    ) -> CoreResult<Order> {
        if cart.is_empty() {
            return Err(CoreError::rejected(RejectReason::EmptyCart, "Cart has no items"));
        }
        request.validate()?;

        let now = Utc::now();
        let mut quote = self.quote(cart, coupon, now).await?;
        let mut applied = coupon.filter(|_| quote.discount > Decimal::ZERO);
        let customer = request.customer(cart.owner.user_id());

        let max_attempts = self.settings.order_number_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let order_number = self.numbers.next_number(&self.settings.order_number_prefix, now);
            let order = build_order(request, &customer, &quote, applied.map(|c| c.id), order_number, now);
            let redemption = applied.map(|c| CouponRedemption {
                coupon_id: c.id,
                user_id: customer.user_id,
                discount_amount: quote.discount,
            });

            match self.orders.insert_order(&order, redemption.as_ref()).await {
                Ok(()) => {
                    info!(
                        order_number = %order.order_number,
                        items = order.items.len(),
                        total = %order.total_amount,
                        "Order created"
                    );
                    return Ok(order);
                }
                Err(StoreError::Conflict(ConflictKind::OrderNumber)) if attempt < max_attempts => {
                    warn!(order_number = %order.order_number, attempt, "Order number taken, retrying");
                }
                Err(StoreError::Conflict(kind @ (ConflictKind::CouponExhausted | ConflictKind::CouponUserLimit)))
                    if applied.is_some() =>
                {
                    warn!(reason = %kind, "Coupon no longer redeemable, placing order without discount");
                    applied = None;
                    quote.discount = Decimal::ZERO;
                    attempt -= 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Full checkout: resolve the cart's coupon, create the order, empty the cart.
    pub async fn checkout(&self, mut cart: Cart, request: &CheckoutRequest) -> CoreResult<Order> {
        let coupon = match &cart.coupon_code {
            Some(code) => self.coupons.find_coupon_by_code(code).await?,
            None => None,
        };

        let order = self.create_order(request, &cart, coupon.as_ref()).await?;

        cart.clear();
        if let Err(e) = self.carts.save_cart(&cart, None).await {
            // Order is already committed
            warn!(order_number = %order.order_number, "Failed to clear cart after checkout: {}", e);
        }

        Ok(order)
    }
}

fn build_order(
    request: &CheckoutRequest,
    customer: &CustomerInfo,
    quote: &Quote,
    coupon_id: Option<Uuid>,
    order_number: String,
    now: DateTime<Utc>,
) -> Order {
    let order_id = Uuid::new_v4();
    let items = quote
        .lines
        .iter()
        .map(|line| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            book_id: Some(line.book_id),
            book_title: line.title.clone(),
            price: line.unit_price,
            quantity: line.quantity,
        })
        .collect();

    Order {
        id: order_id,
        order_number,
        customer: customer.clone(),
        subtotal: quote.subtotal,
        discount_amount: quote.discount,
        shipping_cost: quote.shipping_cost,
        total_amount: quote.total(),
        coupon_id,
        payment_method: request.payment_method,
        status: OrderStatus::Pending,
        customer_notes: request.customer_notes.trim().to_string(),
        items,
        created_at: now,
        updated_at: now,
    }
}
