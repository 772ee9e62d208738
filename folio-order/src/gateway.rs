use async_trait::async_trait;
use folio_core::payment::{GatewayCallback, GatewayError, GatewayRedirect, GatewayRequest, PaymentGateway};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const FIELD_SEPARATOR: &[u8] = b"|";

/// MAC over the fields joined with `|`, so a boundary cannot shift between fields.
fn keyed_mac(secret: &str, parts: &[&str]) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            mac.update(FIELD_SEPARATOR);
        }
        mac.update(part.as_bytes());
    }
    Some(mac)
}

fn hmac_hex(secret: &str, parts: &[&str]) -> Option<String> {
    let mac = keyed_mac(secret, parts)?;
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a hex signature against the expected MAC.
fn verify_hmac_hex(secret: &str, parts: &[&str], signature: &str) -> bool {
    let Ok(raw) = hex::decode(signature.trim()) else {
        return false;
    };
    let Some(mac) = keyed_mac(secret, parts) else {
        return false;
    };
    mac.verify_slice(&raw).is_ok()
}

/// Redirects to the built-in mock payment page. Callbacks are trusted.
pub struct SandboxGateway {
    public_base_url: String,
}

impl SandboxGateway {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self { public_base_url: public_base_url.into() }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_payment(&self, request: &GatewayRequest) -> Result<GatewayRedirect, GatewayError> {
        let transaction_id = Uuid::new_v4().to_string();
        debug!(order_number = %request.order_number, %transaction_id, "Sandbox payment created");
        Ok(GatewayRedirect {
            redirect_url: format!(
                "{}/v1/payments/mock/{}",
                self.public_base_url.trim_end_matches('/'),
                transaction_id
            ),
            transaction_id,
        })
    }

    fn verify_callback(&self, _callback: &GatewayCallback) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HostedGatewayConfig {
    pub api_url: String,
    pub merchant_id: String,
    pub secret_key: String,
    pub callback_url: String,
}

#[derive(Serialize)]
struct CreatePaymentPayload<'a> {
    merchant_id: &'a str,
    amount: String,
    currency: &'a str,
    order_id: &'a str,
    description: &'a str,
    callback_url: &'a str,
    signature: String,
}

#[derive(Deserialize)]
struct CreatePaymentResponse {
    transaction_id: String,
    redirect_url: String,
}

/// Real provider: signed JSON request, hosted payment page, signed callbacks.
pub struct HostedGateway {
    client: reqwest::Client,
    config: HostedGatewayConfig,
}

impl HostedGateway {
    pub fn new(config: HostedGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// hex(HMAC-SHA256(secret, "merchant_id|order_id|amount|currency"))
    pub fn sign_request(&self, order_id: &str, amount: &str, currency: &str) -> Option<String> {
        hmac_hex(
            &self.config.secret_key,
            &[&self.config.merchant_id, order_id, amount, currency],
        )
    }

    /// hex(HMAC-SHA256(secret, "merchant_id|transaction_id|status"))
    pub fn sign_callback(&self, transaction_id: &str, status: &str) -> Option<String> {
        hmac_hex(
            &self.config.secret_key,
            &[&self.config.merchant_id, transaction_id, status],
        )
    }
}

#[async_trait]
impl PaymentGateway for HostedGateway {
    async fn create_payment(&self, request: &GatewayRequest) -> Result<GatewayRedirect, GatewayError> {
        let amount = format!("{:.2}", request.amount);
        let signature = self
            .sign_request(&request.order_number, &amount, &request.currency)
            .ok_or_else(|| GatewayError::Rejected("Unable to sign request".to_string()))?;

        let payload = CreatePaymentPayload {
            merchant_id: &self.config.merchant_id,
            amount,
            currency: &request.currency,
            order_id: &request.order_number,
            description: &request.description,
            callback_url: &self.config.callback_url,
            signature,
        };

        let url = format!("{}/create", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{}: {}", status, body)));
        }

        let created: CreatePaymentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("Malformed gateway response: {}", e)))?;

        Ok(GatewayRedirect {
            transaction_id: created.transaction_id,
            redirect_url: created.redirect_url,
        })
    }

    fn verify_callback(&self, callback: &GatewayCallback) -> Result<(), GatewayError> {
        let Some(signature) = callback.signature.as_deref() else {
            warn!(transaction_id = %callback.transaction_id, "Callback without signature");
            return Err(GatewayError::InvalidSignature);
        };

        let valid = verify_hmac_hex(
            &self.config.secret_key,
            &[&self.config.merchant_id, &callback.transaction_id, &callback.status],
            signature,
        );
        if !valid {
            warn!(transaction_id = %callback.transaction_id, "Callback signature mismatch");
            return Err(GatewayError::InvalidSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hosted() -> HostedGateway {
        HostedGateway::new(HostedGatewayConfig {
            api_url: "https://gateway.example/v1/payment".to_string(),
            merchant_id: "merchant".to_string(),
            secret_key: "secret".to_string(),
            callback_url: "https://shop.example/v1/payments/callback".to_string(),
        })
        .unwrap()
    }

    fn callback(status: &str, signature: Option<String>) -> GatewayCallback {
        let mut fields = BTreeMap::new();
        fields.insert("transaction_id".to_string(), "tx-42".to_string());
        fields.insert("status".to_string(), status.to_string());
        if let Some(sig) = signature {
            fields.insert("signature".to_string(), sig);
        }
        GatewayCallback::from_fields(fields)
    }

    #[test]
    fn test_request_signature_is_hmac_of_delimited_fields() {
        let gateway = hosted();
        let expected = hmac_hex("secret", &["merchant|OLR1|2600.00|AZN"]).unwrap();

        assert_eq!(gateway.sign_request("OLR1", "2600.00", "AZN").unwrap(), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_field_boundary_is_part_of_signature() {
        let gateway = hosted();

        assert_ne!(
            gateway.sign_callback("tx-42", "success").unwrap(),
            gateway.sign_callback("tx-4", "2success").unwrap()
        );
        assert_ne!(
            gateway.sign_request("OLR1", "2600.00", "AZN").unwrap(),
            gateway.sign_request("OLR12", "600.00", "AZN").unwrap()
        );
    }

    #[test]
    fn test_valid_callback_signature_accepted() {
        let gateway = hosted();
        let sig = gateway.sign_callback("tx-42", "success").unwrap();

        assert!(gateway.verify_callback(&callback("success", Some(sig))).is_ok());
    }

    #[test]
    fn test_tampered_callback_rejected() {
        let gateway = hosted();
        // Signed as a failure, presented as a success
        let sig = gateway.sign_callback("tx-42", "failed").unwrap();

        let err = gateway.verify_callback(&callback("success", Some(sig))).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));

        let err = gateway.verify_callback(&callback("success", None)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));

        let err = gateway
            .verify_callback(&callback("success", Some("not-hex".to_string())))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_sandbox_redirects_to_mock_page() {
        let gateway = SandboxGateway::new("http://localhost:8080/");
        let request = GatewayRequest {
            order_number: "OLR1".to_string(),
            amount: rust_decimal::Decimal::new(950, 2),
            currency: "AZN".to_string(),
            description: "Order #OLR1".to_string(),
        };

        let redirect = gateway.create_payment(&request).await.unwrap();

        assert_eq!(
            redirect.redirect_url,
            format!("http://localhost:8080/v1/payments/mock/{}", redirect.transaction_id)
        );
        assert!(gateway.verify_callback(&callback("success", None)).is_ok());
    }
}
