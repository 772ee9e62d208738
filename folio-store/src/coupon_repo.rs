use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_catalog::{Coupon, DiscountType};
use folio_core::repository::{CouponRepository, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_err;

pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    description: String,
    discount_type: String,
    discount_value: Decimal,
    min_purchase_amount: Option<Decimal>,
    max_discount_amount: Option<Decimal>,
    usage_limit: Option<i32>,
    usage_limit_per_user: i32,
    usage_count: i32,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount_type = DiscountType::parse(&row.discount_type)
            .ok_or_else(|| StoreError::Database(format!("Unknown discount type: {}", row.discount_type)))?;
        Ok(Coupon {
            id: row.id,
            code: row.code,
            description: row.description,
            discount_type,
            discount_value: row.discount_value,
            min_purchase_amount: row.min_purchase_amount,
            max_discount_amount: row.max_discount_amount,
            usage_limit: row.usage_limit,
            usage_limit_per_user: row.usage_limit_per_user,
            usage_count: row.usage_count,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

const COUPON_COLUMNS: &str = "id, code, description, discount_type, discount_value, min_purchase_amount, \
    max_discount_amount, usage_limit, usage_limit_per_user, usage_count, valid_from, valid_until, is_active, created_at";

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE UPPER(code) = $1"))
                .bind(Coupon::normalize_code(code))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;

        row.map(Coupon::try_from).transpose()
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        let row: Option<CouponRow> = sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

        row.map(Coupon::try_from).transpose()
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, description, discount_type, discount_value, min_purchase_amount,
                                 max_discount_amount, usage_limit, usage_limit_per_user, usage_count,
                                 valid_from, valid_until, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                description = EXCLUDED.description,
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                min_purchase_amount = EXCLUDED.min_purchase_amount,
                max_discount_amount = EXCLUDED.max_discount_amount,
                usage_limit = EXCLUDED.usage_limit,
                usage_limit_per_user = EXCLUDED.usage_limit_per_user,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(coupon.id)
        .bind(Coupon::normalize_code(&coupon.code))
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.min_purchase_amount)
        .bind(coupon.max_discount_amount)
        .bind(coupon.usage_limit)
        .bind(coupon.usage_limit_per_user)
        .bind(coupon.usage_count)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(())
    }
}
