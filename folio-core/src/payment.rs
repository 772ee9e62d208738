use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Payment attempt for an order (one per order)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Gateway's reference, unique across payments
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub redirect_url: Option<String>,
    /// Raw gateway payload from the last callback
    pub response_data: serde_json::Value,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(order_id: Uuid, amount: Decimal, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            transaction_id: None,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            redirect_url: None,
            response_data: serde_json::json!({}),
            error_message: String::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// What we ask the gateway to charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
}

/// Where to send the customer to complete payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayRedirect {
    pub transaction_id: String,
    pub redirect_url: String,
}

/// Inbound callback from the gateway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayCallback {
    pub transaction_id: String,
    pub status: String,
    pub signature: Option<String>,
    pub error_msg: Option<String>,
    /// Every field received, kept as the payment's raw response
    #[serde(default)]
    pub raw: BTreeMap<String, String>,
}

impl GatewayCallback {
    pub const SUCCESS: &'static str = "success";

    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self {
            transaction_id: fields.get("transaction_id").cloned().unwrap_or_default(),
            status: fields
                .get("status")
                .or_else(|| fields.get("result"))
                .cloned()
                .unwrap_or_default(),
            signature: fields.get("signature").cloned(),
            error_msg: fields.get("error_msg").cloned(),
            raw: fields,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a payment with the provider and get the customer redirect
    async fn create_payment(&self, request: &GatewayRequest) -> Result<GatewayRedirect, GatewayError>;

    /// Check the callback really came from the provider
    fn verify_callback(&self, callback: &GatewayCallback) -> Result<(), GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway unreachable: {0}")]
    Unreachable(String),
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Callback signature mismatch")]
    InvalidSignature,
}
