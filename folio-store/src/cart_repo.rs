use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_catalog::{Cart, CartItem, CartOwner};
use folio_core::repository::{CartRepository, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_err;
use crate::order_repo::{to_db_quantity, to_quantity};

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_key: Option<String>,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    book_id: Uuid,
    quantity: i32,
    price_at_addition: Decimal,
    added_at: DateTime<Utc>,
}

fn owner_columns(owner: &CartOwner) -> (Option<Uuid>, Option<&str>) {
    match owner {
        CartOwner::Authenticated(user_id) => (Some(*user_id), None),
        CartOwner::Anonymous(session_key) => (None, Some(session_key.as_str())),
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        let (user_id, session_key) = owner_columns(owner);

        let row: Option<CartRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, session_key, coupon_code, created_at, updated_at
            FROM carts
            WHERE ($1::uuid IS NOT NULL AND user_id = $1)
               OR ($2::text IS NOT NULL AND session_key = $2)
            "#,
        )
        .bind(user_id)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<CartItemRow> = sqlx::query_as(
            "SELECT book_id, quantity, price_at_addition, added_at FROM cart_items WHERE cart_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        let owner = match (row.user_id, row.session_key) {
            (Some(user_id), _) => CartOwner::Authenticated(user_id),
            (None, Some(session_key)) => CartOwner::Anonymous(session_key),
            (None, None) => return Err(StoreError::Database(format!("Cart {} has no owner", row.id))),
        };

        let items = items
            .into_iter()
            .map(|item| {
                Ok(CartItem {
                    book_id: item.book_id,
                    quantity: to_quantity(item.quantity)?,
                    price_at_addition: item.price_at_addition,
                    added_at: item.added_at,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(Cart {
            id: row.id,
            owner,
            items,
            coupon_code: row.coupon_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn save_cart(&self, cart: &Cart, discard: Option<Uuid>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // Drop the merged-away cart first so its owner key is free.
        if let Some(discard_id) = discard.filter(|id| *id != cart.id) {
            sqlx::query("DELETE FROM carts WHERE id = $1")
                .bind(discard_id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
        }

        let (user_id, session_key) = owner_columns(&cart.owner);

        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, session_key, coupon_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                session_key = EXCLUDED.session_key,
                coupon_code = EXCLUDED.coupon_code,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id)
        .bind(user_id)
        .bind(session_key)
        .bind(&cart.coupon_code)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, book_id, quantity, price_at_addition, added_at, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(cart.id)
            .bind(item.book_id)
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.price_at_addition)
            .bind(item.added_at)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}
