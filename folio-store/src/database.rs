use folio_core::repository::{ConflictKind, StoreError};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::app_config::CheckoutSettings;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay checkout settings stored in the database on top of file configuration.
    pub async fn fetch_checkout_settings(&self, defaults: CheckoutSettings) -> Result<CheckoutSettings, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT setting_key, setting_value FROM store_settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_settings(defaults, rows))
    }
}

/// Expected row format: {"value": <number/string>}
fn apply_settings(defaults: CheckoutSettings, rows: Vec<(String, Value)>) -> CheckoutSettings {
    let mut settings = defaults;

    for (key, val) in rows {
        let Some(v) = val.get("value") else {
            continue;
        };
        match key.as_str() {
            "shipping_cost" => {
                let parsed = v
                    .as_str()
                    .and_then(|s| Decimal::from_str(s).ok())
                    .or_else(|| v.as_f64().and_then(Decimal::from_f64_retain));
                if let Some(cost) = parsed.filter(|c| *c >= Decimal::ZERO) {
                    settings.shipping_cost = cost;
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    settings.currency = s.to_string();
                }
            }
            "order_number_prefix" => {
                if let Some(s) = v.as_str() {
                    settings.order_number_prefix = s.to_string();
                }
            }
            _ => {}
        }
    }

    settings
}

/// Translate sqlx failures, surfacing the uniqueness constraints callers retry on.
pub(crate) fn map_db_err(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.constraint() {
            Some("orders_order_number_key") => return StoreError::Conflict(ConflictKind::OrderNumber),
            Some("payments_transaction_id_key") => return StoreError::Conflict(ConflictKind::TransactionId),
            _ => {}
        }
    }
    StoreError::Database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_overlay() {
        let rows = vec![
            ("shipping_cost".to_string(), serde_json::json!({"value": "3.50"})),
            ("order_number_prefix".to_string(), serde_json::json!({"value": "BK"})),
            ("unknown".to_string(), serde_json::json!({"value": 1})),
        ];

        let settings = apply_settings(CheckoutSettings::default(), rows);

        assert_eq!(settings.shipping_cost, Decimal::new(350, 2));
        assert_eq!(settings.order_number_prefix, "BK");
        assert_eq!(settings.currency, "AZN");
    }

    #[test]
    fn test_negative_shipping_ignored() {
        let rows = vec![("shipping_cost".to_string(), serde_json::json!({"value": -1.0}))];
        let settings = apply_settings(CheckoutSettings::default(), rows);
        assert_eq!(settings.shipping_cost, Decimal::ZERO);
    }
}
