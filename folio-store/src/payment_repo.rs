use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::repository::{ConflictKind, OrderTransition, PaymentRepository, StoreError};
use folio_core::{Payment, PaymentStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::map_db_err;
use crate::order_repo::write_transition;

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    transaction_id: Option<String>,
    amount: Decimal,
    currency: String,
    status: String,
    redirect_url: Option<String>,
    response_data: serde_json::Value,
    error_message: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Database(format!("Unknown payment status: {}", row.status)))?;
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            transaction_id: row.transaction_id,
            amount: row.amount,
            currency: row.currency,
            status,
            redirect_url: row.redirect_url,
            response_data: row.response_data,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, order_id, transaction_id, amount, currency, status, redirect_url, \
    response_data, error_message, created_at, completed_at";

async fn update_payment(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE payments SET
            transaction_id = $2,
            amount = $3,
            currency = $4,
            status = $5,
            redirect_url = $6,
            response_data = $7,
            error_message = $8,
            completed_at = $9
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(&payment.transaction_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(&payment.redirect_url)
    .bind(&payment.response_data)
    .bind(&payment.error_message)
    .bind(payment.completed_at)
    .execute(&mut **tx)
    .await
    .map_err(map_db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Payment {}", payment.id)));
    }
    Ok(())
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn get_or_create_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<Payment, StoreError> {
        let fresh = Payment::new(order_id, amount, currency);

        // Concurrent callers converge on the single row per order.
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount, currency, status, response_data, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(fresh.order_id)
        .bind(fresh.amount)
        .bind(&fresh.currency)
        .bind(fresh.status.as_str())
        .bind(&fresh.response_data)
        .bind(&fresh.error_message)
        .bind(fresh.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        self.get_payment_for_order(order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Payment for order {}", order_id)))
    }

    async fn get_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"))
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        update_payment(&mut tx, payment).await?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn save_reconciliation(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transition: Option<&OrderTransition>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_err)?;
        let current = current.ok_or_else(|| StoreError::NotFound(format!("Payment {}", payment.id)))?;
        if current != expected.as_str() {
            return Err(StoreError::Conflict(ConflictKind::StaleState));
        }

        update_payment(&mut tx, payment).await?;
        if let Some(transition) = transition {
            write_transition(&mut tx, transition).await?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}
