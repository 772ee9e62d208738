use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub checkout: CheckoutSettings,
    pub payment: PaymentConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty selects the in-memory store
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CheckoutSettings {
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_prefix")]
    pub order_number_prefix: String,
    #[serde(default = "default_attempts")]
    pub order_number_attempts: u32,
}

fn default_currency() -> String { folio_shared::DEFAULT_CURRENCY.to_string() }
fn default_prefix() -> String { "OLR".to_string() }
fn default_attempts() -> u32 { 5 }

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            shipping_cost: Decimal::ZERO,
            currency: default_currency(),
            order_number_prefix: default_prefix(),
            order_number_attempts: default_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Sandbox,
    Production,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub mode: PaymentMode,
    pub api_url: String,
    pub merchant_id: String,
    pub secret_key: String,
    /// Absolute URL the gateway calls back
    pub callback_url: String,
    /// Base URL used to build sandbox redirect targets
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmsMode {
    Mock,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    pub mode: SmsMode,
    pub api_url: String,
    pub api_key: String,
    pub sender_name: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `FOLIO_PAYMENT__MODE=production` sets `payment.mode`
            .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [database]
        url = ""

        [auth]
        jwt_secret = "secret"
        session_expiration_seconds = 3600

        [checkout]
        shipping_cost = "2.50"

        [payment]
        mode = "sandbox"
        api_url = "https://gateway.example/v1/payment"
        merchant_id = "merchant"
        secret_key = "key"
        callback_url = "http://localhost:8080/v1/payments/callback"
        public_base_url = "http://localhost:8080"

        [sms]
        mode = "mock"
        api_url = "https://sms.example/api/send"
        api_key = "test_key"
        sender_name = "FOLIO"
    "#;

    #[test]
    fn test_sample_config_parses_with_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(SAMPLE, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.payment.mode, PaymentMode::Sandbox);
        assert_eq!(config.sms.mode, SmsMode::Mock);
        assert_eq!(config.checkout.shipping_cost, Decimal::new(250, 2));
        assert_eq!(config.checkout.currency, "AZN");
        assert_eq!(config.checkout.order_number_prefix, "OLR");
        assert_eq!(config.checkout.order_number_attempts, 5);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.database.url.is_empty());
    }
}
