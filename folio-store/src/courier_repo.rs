use async_trait::async_trait;
use folio_core::repository::{CourierRepository, StoreError};
use folio_core::Courier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_err;

pub struct PgCourierRepository {
    pool: PgPool,
}

impl PgCourierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CourierRow {
    id: Uuid,
    name: String,
    phone: String,
    vehicle_type: String,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CourierRow> for Courier {
    fn from(row: CourierRow) -> Self {
        Courier {
            id: row.id,
            name: row.name,
            phone: row.phone,
            vehicle_type: row.vehicle_type,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CourierRepository for PgCourierRepository {
    async fn create_courier(&self, courier: &Courier) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO couriers (id, name, phone, vehicle_type, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(courier.id)
        .bind(&courier.name)
        .bind(&courier.phone)
        .bind(&courier.vehicle_type)
        .bind(courier.is_active)
        .bind(courier.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(())
    }

    async fn get_courier(&self, id: Uuid) -> Result<Option<Courier>, StoreError> {
        let row: Option<CourierRow> = sqlx::query_as(
            "SELECT id, name, phone, vehicle_type, is_active, created_at FROM couriers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(row.map(Courier::from))
    }

    async fn list_couriers(&self, active_only: bool) -> Result<Vec<Courier>, StoreError> {
        let rows: Vec<CourierRow> = sqlx::query_as(
            r#"
            SELECT id, name, phone, vehicle_type, is_active, created_at
            FROM couriers
            WHERE is_active OR NOT $1
            ORDER BY is_active DESC, name
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Courier::from).collect())
    }

    async fn set_courier_active(&self, id: Uuid, is_active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE couriers SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Courier {}", id)));
        }
        Ok(())
    }
}
