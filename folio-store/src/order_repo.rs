use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::repository::{
    ConflictKind, CouponRedemption, OrderRepository, OrderTransition, StoreError,
};
use folio_core::{CustomerInfo, Delivery, DeliveryStatus, Order, OrderItem, OrderStatus, PaymentMethod};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::map_db_err;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    full_name: String,
    email: String,
    phone: String,
    address: String,
    city: String,
    postal_code: String,
    subtotal: Decimal,
    discount_amount: Decimal,
    shipping_cost: Decimal,
    total_amount: Decimal,
    coupon_id: Option<Uuid>,
    payment_method: String,
    status: String,
    customer_notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    book_id: Option<Uuid>,
    book_title: String,
    price: Decimal,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeliveryRow {
    id: Uuid,
    order_id: Uuid,
    courier_id: Option<Uuid>,
    status: String,
    assigned_at: Option<DateTime<Utc>>,
    picked_up_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    notes: String,
    tracking_number: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, full_name, email, phone, address, city, postal_code, \
    subtotal, discount_amount, shipping_cost, total_amount, coupon_id, payment_method, status, \
    customer_notes, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, book_id, book_title, price, quantity";

const DELIVERY_COLUMNS: &str = "id, order_id, courier_id, status, assigned_at, picked_up_at, delivered_at, \
    notes, tracking_number, created_at, updated_at";

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let payment_method = PaymentMethod::parse(&self.payment_method)
            .ok_or_else(|| StoreError::Database(format!("Unknown payment method: {}", self.payment_method)))?;

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer: CustomerInfo {
                user_id: self.user_id,
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
                address: self.address,
                city: self.city,
                postal_code: self.postal_code,
            },
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            shipping_cost: self.shipping_cost,
            total_amount: self.total_amount,
            coupon_id: self.coupon_id,
            payment_method,
            status,
            customer_notes: self.customer_notes,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OrderItemRow {
    fn into_item(self) -> Result<OrderItem, StoreError> {
        Ok(OrderItem {
            id: self.id,
            order_id: self.order_id,
            book_id: self.book_id,
            book_title: self.book_title,
            price: self.price,
            quantity: to_quantity(self.quantity)?,
        })
    }
}

impl DeliveryRow {
    pub(crate) fn into_delivery(self) -> Result<Delivery, StoreError> {
        let status = DeliveryStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Database(format!("Unknown delivery status: {}", self.status)))?;
        Ok(Delivery {
            id: self.id,
            order_id: self.order_id,
            courier_id: self.courier_id,
            status,
            assigned_at: self.assigned_at,
            picked_up_at: self.picked_up_at,
            delivered_at: self.delivered_at,
            notes: self.notes,
            tracking_number: self.tracking_number,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn to_quantity(raw: i32) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Database(format!("Negative quantity stored: {}", raw)))
}

pub(crate) fn to_db_quantity(quantity: u32) -> Result<i32, StoreError> {
    i32::try_from(quantity).map_err(|_| StoreError::Database(format!("Quantity out of range: {}", quantity)))
}

/// Apply a status change and its delivery row inside an open transaction.
///
/// The order row stays locked until commit, so concurrent transitions on the
/// same order run one after the other and each sees the previous one's result.
pub(crate) async fn write_transition(
    tx: &mut Transaction<'_, Postgres>,
    transition: &OrderTransition,
) -> Result<(), StoreError> {
    let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
        .bind(transition.order_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_err)?;
    let current = current.ok_or_else(|| StoreError::NotFound(format!("Order {}", transition.order_id)))?;

    let delivery_version: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT updated_at FROM deliveries WHERE order_id = $1")
            .bind(transition.order_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_err)?;

    if current != transition.expected_status.as_str() || delivery_version != transition.expected_delivery {
        return Err(StoreError::Conflict(ConflictKind::StaleState));
    }

    let result = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(transition.order_id)
        .bind(transition.status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(map_db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Order {}", transition.order_id)));
    }

    if let Some(delivery) = &transition.delivery {
        sqlx::query(
            r#"
            INSERT INTO deliveries (id, order_id, courier_id, status, assigned_at, picked_up_at, delivered_at, notes, tracking_number, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id) DO UPDATE SET
                courier_id = EXCLUDED.courier_id,
                status = EXCLUDED.status,
                assigned_at = EXCLUDED.assigned_at,
                picked_up_at = EXCLUDED.picked_up_at,
                delivered_at = EXCLUDED.delivered_at,
                notes = EXCLUDED.notes,
                tracking_number = EXCLUDED.tracking_number,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(delivery.courier_id)
        .bind(delivery.status.as_str())
        .bind(delivery.assigned_at)
        .bind(delivery.picked_up_at)
        .bind(delivery.delivered_at)
        .bind(&delivery.notes)
        .bind(&delivery.tracking_number)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(map_db_err)?;
    }

    Ok(())
}

async fn redeem_coupon(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    redemption: &CouponRedemption,
) -> Result<(), StoreError> {
    // Row lock on the coupon serializes concurrent redemptions.
    let result = sqlx::query(
        r#"
        UPDATE coupons SET usage_count = usage_count + 1
        WHERE id = $1 AND is_active AND (usage_limit IS NULL OR usage_count < usage_limit)
        "#,
    )
    .bind(redemption.coupon_id)
    .execute(&mut **tx)
    .await
    .map_err(map_db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(ConflictKind::CouponExhausted));
    }

    if let Some(user_id) = redemption.user_id {
        let (per_user_limit, used): (i32, i64) = sqlx::query_as(
            r#"
            SELECT c.usage_limit_per_user,
                   (SELECT COUNT(*) FROM coupon_usages u WHERE u.coupon_id = c.id AND u.user_id = $2)
            FROM coupons c WHERE c.id = $1
            "#,
        )
        .bind(redemption.coupon_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_err)?;

        if used >= i64::from(per_user_limit) {
            return Err(StoreError::Conflict(ConflictKind::CouponUserLimit));
        }
    }

    sqlx::query(
        "INSERT INTO coupon_usages (id, coupon_id, user_id, order_id, discount_amount) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(redemption.coupon_id)
    .bind(redemption.user_id)
    .bind(order_id)
    .bind(redemption.discount_amount)
    .execute(&mut **tx)
    .await
    .map_err(map_db_err)?;

    Ok(())
}

impl PgOrderRepository {
    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY position"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row.into_item()?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> Result<Option<Order>, StoreError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(
        &self,
        order: &Order,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, full_name, email, phone, address, city, postal_code,
                                subtotal, discount_amount, shipping_cost, total_amount, coupon_id, payment_method,
                                status, customer_notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer.user_id)
        .bind(&order.customer.full_name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(&order.customer.address)
        .bind(&order.customer.city)
        .bind(&order.customer.postal_code)
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(order.shipping_cost)
        .bind(order.total_amount)
        .bind(order.coupon_id)
        .bind(order.payment_method.as_str())
        .bind(order.status.as_str())
        .bind(&order.customer_notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, book_id, book_title, price, quantity, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.book_id)
            .bind(&item.book_title)
            .bind(item.price)
            .bind(to_db_quantity(item.quantity)?)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        if let Some(redemption) = redemption {
            redeem_coupon(&mut tx, order.id, redemption).await?;
        }

        tx.commit().await.map_err(map_db_err)?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

        self.hydrate_one(row).await
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"))
                .bind(order_number)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;

        self.hydrate_one(row).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        self.hydrate(rows).await
    }

    async fn get_delivery(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let row: Option<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        row.map(DeliveryRow::into_delivery).transpose()
    }

    async fn save_transition(&self, transition: &OrderTransition) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        write_transition(&mut tx, transition).await?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}
