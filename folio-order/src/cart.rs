use chrono::Utc;
use folio_catalog::{Cart, CartOwner, CatalogService, Coupon, CouponEvaluator, PricedLine};
use folio_core::repository::{CartRepository, CouponRepository};
use folio_core::{CoreError, CoreResult, RejectReason};
use folio_shared::round_money;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Cart priced at current catalog prices
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub cart_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub total_items: u32,
    pub subtotal: Decimal,
    pub coupon_code: Option<String>,
    pub discount: Decimal,
    pub total: Decimal,
}

pub struct CartService {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn CatalogService>,
    coupons: Arc<dyn CouponRepository>,
    evaluator: CouponEvaluator,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        catalog: Arc<dyn CatalogService>,
        coupons: Arc<dyn CouponRepository>,
    ) -> Self {
        Self {
            carts,
            catalog,
            coupons,
            evaluator: CouponEvaluator::new(),
        }
    }

    async fn load(&self, owner: &CartOwner) -> CoreResult<Cart> {
        match self.carts.find_cart(owner).await? {
            Some(cart) => Ok(cart),
            None => {
                let cart = Cart::new(owner.clone());
                self.carts.save_cart(&cart, None).await?;
                debug!(cart_id = %cart.id, "Cart created");
                Ok(cart)
            }
        }
    }

    /// Cart for `owner`, created on first use.
    ///
    /// An authenticated owner presenting an anonymous key absorbs that cart,
    /// and the anonymous cart is deleted in the same write.
    pub async fn resolve(&self, owner: &CartOwner, anonymous_key: Option<&str>) -> CoreResult<Cart> {
        let anonymous = match (owner, anonymous_key) {
            (CartOwner::Authenticated(_), Some(key)) if !key.is_empty() => {
                self.carts.find_cart(&CartOwner::Anonymous(key.to_string())).await?
            }
            _ => None,
        };

        let Some(mut anonymous) = anonymous else {
            return self.load(owner).await;
        };

        match self.carts.find_cart(owner).await? {
            Some(mut cart) => {
                let discard = anonymous.id;
                cart.merge_from(anonymous);
                self.carts.save_cart(&cart, Some(discard)).await?;
                info!(cart_id = %cart.id, merged = %discard, "Anonymous cart merged");
                Ok(cart)
            }
            None => {
                anonymous.owner = owner.clone();
                anonymous.updated_at = Utc::now();
                self.carts.save_cart(&anonymous, None).await?;
                info!(cart_id = %anonymous.id, "Anonymous cart adopted on login");
                Ok(anonymous)
            }
        }
    }

    pub async fn add(
        &self,
        owner: &CartOwner,
        book_id: Uuid,
        quantity: u32,
        update_quantity: bool,
    ) -> CoreResult<CartSummary> {
        let mut cart = self.load(owner).await?;
        let book = self
            .catalog
            .get_book(book_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Book {}", book_id)))?;

        cart.add(&book, quantity, update_quantity)?;
        self.carts.save_cart(&cart, None).await?;

        self.price(&cart).await
    }

    pub async fn remove(&self, owner: &CartOwner, book_id: Uuid) -> CoreResult<CartSummary> {
        let mut cart = self.load(owner).await?;
        if cart.remove(book_id) {
            self.carts.save_cart(&cart, None).await?;
        }
        self.price(&cart).await
    }

    pub async fn clear(&self, owner: &CartOwner) -> CoreResult<CartSummary> {
        let mut cart = self.load(owner).await?;
        cart.clear();
        self.carts.save_cart(&cart, None).await?;
        self.price(&cart).await
    }

    /// Attach a coupon code. A rejected code also detaches any previous one.
    pub async fn apply_coupon(&self, owner: &CartOwner, code: &str) -> CoreResult<CartSummary> {
        let mut cart = self.load(owner).await?;

        let verdict = match self.coupons.find_coupon_by_code(code).await? {
            Some(coupon) => self
                .evaluator
                .validate(&coupon, Utc::now())
                .map(|_| coupon)
                .map_err(CoreError::from),
            None => Err(CoreError::rejected(
                RejectReason::InvalidCoupon,
                format!("Coupon {} does not exist", Coupon::normalize_code(code)),
            )),
        };

        match verdict {
            Ok(coupon) => {
                cart.coupon_code = Some(coupon.code.clone());
                self.carts.save_cart(&cart, None).await?;
                info!(cart_id = %cart.id, code = %coupon.code, "Coupon applied");
                self.price(&cart).await
            }
            Err(e) => {
                if cart.coupon_code.take().is_some() {
                    self.carts.save_cart(&cart, None).await?;
                }
                Err(e)
            }
        }
    }

    pub async fn remove_coupon(&self, owner: &CartOwner) -> CoreResult<CartSummary> {
        let mut cart = self.load(owner).await?;
        if cart.coupon_code.take().is_some() {
            self.carts.save_cart(&cart, None).await?;
        }
        self.price(&cart).await
    }

    pub async fn summary(&self, owner: &CartOwner) -> CoreResult<CartSummary> {
        let cart = self.load(owner).await?;
        self.price(&cart).await
    }

    /// Books that left the catalog are skipped.
    pub async fn price(&self, cart: &Cart) -> CoreResult<CartSummary> {
        let books = self.catalog.get_books(&cart.book_ids()).await?;
        let known: HashSet<Uuid> = books.iter().map(|b| b.id).collect();

        let mut available = cart.clone();
        available.items.retain(|item| known.contains(&item.book_id));
        let lines = available.price(&books)?;

        let subtotal = round_money(PricedLine::subtotal(&lines));
        let coupon = match &cart.coupon_code {
            Some(code) => self.coupons.find_coupon_by_code(code).await?,
            None => None,
        };
        let discount = self.evaluator.evaluate(coupon.as_ref(), subtotal, Utc::now());

        Ok(CartSummary {
            cart_id: cart.id,
            total_items: available.total_items(),
            lines,
            subtotal,
            coupon_code: cart.coupon_code.clone(),
            discount,
            total: round_money(subtotal - discount),
        })
    }
}
