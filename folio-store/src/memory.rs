use async_trait::async_trait;
use chrono::Utc;
use folio_catalog::{Book, Cart, CartOwner, CatalogError, CatalogService, Coupon};
use folio_core::repository::{
    CartRepository, ConflictKind, CouponRedemption, CouponRepository, CourierRepository, OrderRepository,
    OrderTransition, PaymentRepository, StoreError,
};
use folio_core::{Courier, Delivery, Order, OrderStatus, Payment, PaymentStatus};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub coupon_id: Uuid,
    pub user_id: Option<Uuid>,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
}

#[derive(Default)]
struct State {
    books: HashMap<Uuid, Book>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    usages: Vec<UsageRecord>,
    /// Insertion order, oldest first
    orders: Vec<Order>,
    deliveries: HashMap<Uuid, Delivery>,
    /// Keyed by order id
    payments: HashMap<Uuid, Payment>,
    couriers: HashMap<Uuid, Courier>,
}

impl State {
    fn order_mut(&mut self, id: Uuid) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    /// Compare the transition's guard with what is stored now.
    fn check_transition(&self, transition: &OrderTransition) -> Result<(), StoreError> {
        let order = self
            .orders
            .iter()
            .find(|o| o.id == transition.order_id)
            .ok_or_else(|| StoreError::NotFound(format!("Order {}", transition.order_id)))?;
        let delivery_version = self.deliveries.get(&transition.order_id).map(|d| d.updated_at);

        if order.status != transition.expected_status || delivery_version != transition.expected_delivery {
            return Err(StoreError::Conflict(ConflictKind::StaleState));
        }
        Ok(())
    }

    fn apply_transition(&mut self, transition: &OrderTransition) -> Result<(), StoreError> {
        self.check_transition(transition)?;
        let order = self
            .order_mut(transition.order_id)
            .ok_or_else(|| StoreError::NotFound(format!("Order {}", transition.order_id)))?;
        order.status = transition.status;
        order.updated_at = Utc::now();

        if let Some(delivery) = &transition.delivery {
            self.deliveries.insert(delivery.order_id, delivery.clone());
        }
        Ok(())
    }

    fn check_transaction_unique(&self, payment: &Payment) -> Result<(), StoreError> {
        let Some(tx_id) = &payment.transaction_id else {
            return Ok(());
        };
        let taken = self
            .payments
            .values()
            .any(|p| p.id != payment.id && p.transaction_id.as_ref() == Some(tx_id));
        if taken {
            return Err(StoreError::Conflict(ConflictKind::TransactionId));
        }
        Ok(())
    }
}

/// Single-process store holding everything behind one lock.
///
/// Every write happens under the lock, so each repository call is atomic the
/// same way a database transaction would be.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_book(&self, book: Book) {
        self.state.lock().await.books.insert(book.id, book);
    }

    pub async fn set_book_price(&self, id: Uuid, price: Decimal) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Book {}", id)))?;
        book.current_price = price;
        Ok(())
    }

    pub async fn remove_book(&self, id: Uuid) {
        self.state.lock().await.books.remove(&id);
    }

    pub async fn coupon_usages(&self, coupon_id: Uuid) -> Vec<UsageRecord> {
        self.state
            .lock()
            .await
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CatalogService for MemoryStore {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, CatalogError> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.carts.values().find(|c| &c.owner == owner).cloned())
    }

    async fn save_cart(&self, cart: &Cart, discard: Option<Uuid>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(discard_id) = discard.filter(|id| *id != cart.id) {
            state.carts.remove(&discard_id);
        }

        let owner_taken = state
            .carts
            .values()
            .any(|c| c.id != cart.id && c.owner == cart.owner);
        if owner_taken {
            return Err(StoreError::Database("Cart owner already has a cart".to_string()));
        }

        state.carts.insert(cart.id, cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let wanted = Coupon::normalize_code(code);
        let state = self.state.lock().await;
        Ok(state
            .coupons
            .values()
            .find(|c| Coupon::normalize_code(&c.code) == wanted)
            .cloned())
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.lock().await.coupons.get(&id).cloned())
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut stored = coupon.clone();
        stored.code = Coupon::normalize_code(&coupon.code);
        state.coupons.insert(stored.id, stored);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(
        &self,
        order: &Order,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        if state.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict(ConflictKind::OrderNumber));
        }

        // Validate everything before the first write so a rejection leaves no trace.
        if let Some(redemption) = redemption {
            let coupon = state
                .coupons
                .get(&redemption.coupon_id)
                .ok_or(StoreError::Conflict(ConflictKind::CouponExhausted))?;
            if !coupon.is_active || coupon.is_exhausted() {
                return Err(StoreError::Conflict(ConflictKind::CouponExhausted));
            }
            if let Some(user_id) = redemption.user_id {
                let used = state
                    .usages
                    .iter()
                    .filter(|u| u.coupon_id == coupon.id && u.user_id == Some(user_id))
                    .count();
                if used >= usize::try_from(coupon.usage_limit_per_user).unwrap_or(0) {
                    return Err(StoreError::Conflict(ConflictKind::CouponUserLimit));
                }
            }
        }

        if let Some(redemption) = redemption {
            if let Some(coupon) = state.coupons.get_mut(&redemption.coupon_id) {
                coupon.usage_count += 1;
            }
            state.usages.push(UsageRecord {
                coupon_id: redemption.coupon_id,
                user_id: redemption.user_id,
                order_id: order.id,
                discount_amount: redemption.discount_amount,
            });
        }

        state.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.order_number == order_number).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .rev()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_delivery(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.state.lock().await.deliveries.get(&order_id).cloned())
    }

    async fn save_transition(&self, transition: &OrderTransition) -> Result<(), StoreError> {
        self.state.lock().await.apply_transition(transition)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn get_or_create_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        if !state.orders.iter().any(|o| o.id == order_id) {
            return Err(StoreError::NotFound(format!("Order {}", order_id)));
        }
        let payment = state
            .payments
            .entry(order_id)
            .or_insert_with(|| Payment::new(order_id, amount, currency));
        Ok(payment.clone())
    }

    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&order_id).cloned())
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.payments.contains_key(&payment.order_id) {
            return Err(StoreError::NotFound(format!("Payment {}", payment.id)));
        }
        state.check_transaction_unique(payment)?;
        state.payments.insert(payment.order_id, payment.clone());
        Ok(())
    }

    async fn save_reconciliation(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transition: Option<&OrderTransition>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .payments
            .get(&payment.order_id)
            .ok_or_else(|| StoreError::NotFound(format!("Payment {}", payment.id)))?;
        if stored.status != expected {
            return Err(StoreError::Conflict(ConflictKind::StaleState));
        }
        state.check_transaction_unique(payment)?;
        if let Some(transition) = transition {
            state.check_transition(transition)?;
        }

        state.payments.insert(payment.order_id, payment.clone());
        if let Some(transition) = transition {
            state.apply_transition(transition)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CourierRepository for MemoryStore {
    async fn create_courier(&self, courier: &Courier) -> Result<(), StoreError> {
        self.state.lock().await.couriers.insert(courier.id, courier.clone());
        Ok(())
    }

    async fn get_courier(&self, id: Uuid) -> Result<Option<Courier>, StoreError> {
        Ok(self.state.lock().await.couriers.get(&id).cloned())
    }

    async fn list_couriers(&self, active_only: bool) -> Result<Vec<Courier>, StoreError> {
        let state = self.state.lock().await;
        let mut couriers: Vec<Courier> = state
            .couriers
            .values()
            .filter(|c| c.is_active || !active_only)
            .cloned()
            .collect();
        couriers.sort_by(|a, b| b.is_active.cmp(&a.is_active).then_with(|| a.name.cmp(&b.name)));
        Ok(couriers)
    }

    async fn set_courier_active(&self, id: Uuid, is_active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let courier = state
            .couriers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Courier {}", id)))?;
        courier.is_active = is_active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use folio_catalog::DiscountType;
    use folio_core::{CustomerInfo, PaymentMethod};

    fn order(number: &str) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: number.to_string(),
            customer: CustomerInfo {
                user_id: None,
                full_name: "Reader".to_string(),
                email: "reader@example.com".to_string(),
                phone: "+994501112233".to_string(),
                address: "1 Main St".to_string(),
                city: "Baku".to_string(),
                postal_code: String::new(),
            },
            subtotal: Decimal::new(1000, 2),
            discount_amount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            total_amount: Decimal::new(1000, 2),
            coupon_id: None,
            payment_method: PaymentMethod::Card,
            status: OrderStatus::Pending,
            customer_notes: String::new(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn coupon(limit: Option<i32>) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: "save5".to_string(),
            description: String::new(),
            discount_type: DiscountType::Fixed,
            discount_value: Decimal::new(5, 0),
            min_purchase_amount: None,
            max_discount_amount: None,
            usage_limit: limit,
            usage_limit_per_user: 1,
            usage_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_order_number_conflicts() {
        let store = MemoryStore::new();
        store.insert_order(&order("OLR1"), None).await.unwrap();

        let err = store.insert_order(&order("OLR1"), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictKind::OrderNumber)));
    }

    #[tokio::test]
    async fn test_coupon_limit_enforced_at_insert() {
        let store = MemoryStore::new();
        let coupon = coupon(Some(1));
        store.save_coupon(&coupon).await.unwrap();

        let redemption = CouponRedemption {
            coupon_id: coupon.id,
            user_id: None,
            discount_amount: Decimal::new(5, 0),
        };
        store.insert_order(&order("OLR1"), Some(&redemption)).await.unwrap();
        let err = store.insert_order(&order("OLR2"), Some(&redemption)).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(ConflictKind::CouponExhausted)));
        assert_eq!(store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 1);
        assert_eq!(store.coupon_usages(coupon.id).await.len(), 1);
        // Rejected order must not be stored
        assert!(store.get_order_by_number("OLR2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_per_user_limit() {
        let store = MemoryStore::new();
        let coupon = coupon(None);
        store.save_coupon(&coupon).await.unwrap();

        let redemption = CouponRedemption {
            coupon_id: coupon.id,
            user_id: Some(Uuid::new_v4()),
            discount_amount: Decimal::new(5, 0),
        };
        store.insert_order(&order("OLR1"), Some(&redemption)).await.unwrap();
        let err = store.insert_order(&order("OLR2"), Some(&redemption)).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(ConflictKind::CouponUserLimit)));
    }

    #[tokio::test]
    async fn test_coupon_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        store.save_coupon(&coupon(None)).await.unwrap();

        assert!(store.find_coupon_by_code(" Save5 ").await.unwrap().is_some());
        assert!(store.find_coupon_by_code("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payment_created_once_per_order() {
        let store = MemoryStore::new();
        let order = order("OLR1");
        store.insert_order(&order, None).await.unwrap();

        let first = store.get_or_create_payment(order.id, order.total_amount, "AZN").await.unwrap();
        let second = store.get_or_create_payment(order.id, order.total_amount, "AZN").await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_sorts_newest_first() {
        let store = MemoryStore::new();
        let mut older = order("OLR1");
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = order("OLR2");
        store.insert_order(&older, None).await.unwrap();
        store.insert_order(&newer, None).await.unwrap();

        let all = store.list_orders(None).await.unwrap();
        assert_eq!(all[0].order_number, "OLR2");

        store
            .save_transition(&transition(older.id, OrderStatus::Pending, OrderStatus::Confirmed))
            .await
            .unwrap();
        let confirmed = store.list_orders(Some(OrderStatus::Confirmed)).await.unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].order_number, "OLR1");
    }

    fn transition(order_id: Uuid, from: OrderStatus, to: OrderStatus) -> OrderTransition {
        OrderTransition {
            order_id,
            expected_status: from,
            expected_delivery: None,
            status: to,
            delivery: None,
        }
    }

    #[tokio::test]
    async fn test_transition_refused_when_status_moved_on() {
        let store = MemoryStore::new();
        let order = order("OLR1");
        store.insert_order(&order, None).await.unwrap();

        store
            .save_transition(&transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled))
            .await
            .unwrap();
        let err = store
            .save_transition(&transition(order.id, OrderStatus::Pending, OrderStatus::Confirmed))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(ConflictKind::StaleState)));
        assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_transition_refused_when_delivery_rewritten() {
        let store = MemoryStore::new();
        let order = order("OLR1");
        store.insert_order(&order, None).await.unwrap();

        let opened = Delivery::new(order.id, Utc::now());
        let mut first = transition(order.id, OrderStatus::Pending, OrderStatus::Confirmed);
        first.delivery = Some(opened.clone());
        store.save_transition(&first).await.unwrap();

        // Planned against "no delivery yet", but one exists now
        let mut second = transition(order.id, OrderStatus::Confirmed, OrderStatus::Confirmed);
        second.delivery = Some(Delivery::new(order.id, Utc::now()));
        let err = store.save_transition(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictKind::StaleState)));

        second.expected_delivery = Some(opened.updated_at);
        store.save_transition(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconciliation_refused_once_payment_settled() {
        let store = MemoryStore::new();
        let order = order("OLR1");
        store.insert_order(&order, None).await.unwrap();
        let mut payment = store.get_or_create_payment(order.id, order.total_amount, "AZN").await.unwrap();

        payment.status = PaymentStatus::Completed;
        store.save_reconciliation(&payment, PaymentStatus::Pending, None).await.unwrap();

        let err = store
            .save_reconciliation(&payment, PaymentStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictKind::StaleState)));
    }

    #[tokio::test]
    async fn test_couriers_active_first() {
        let store = MemoryStore::new();
        let mut idle = Courier::new("Aysel".to_string(), "+994501".to_string(), "Car".to_string());
        idle.is_active = false;
        let busy = Courier::new("Rashad".to_string(), "+994502".to_string(), "Van".to_string());
        store.create_courier(&idle).await.unwrap();
        store.create_courier(&busy).await.unwrap();

        let all = store.list_couriers(false).await.unwrap();
        assert_eq!(all[0].name, "Rashad");
        assert_eq!(store.list_couriers(true).await.unwrap().len(), 1);
    }
}
