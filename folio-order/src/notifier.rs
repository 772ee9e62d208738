use async_trait::async_trait;
use folio_core::notify::{NotificationTransport, NotifyError};
use folio_core::repository::CourierRepository;
use folio_core::{Courier, Delivery, DeliveryStatus, Order};
use folio_shared::Masked;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Customer-facing text for a delivery status.
///
/// `None` when the status needs a courier and none is attached.
pub fn render_message(status: DeliveryStatus, order_number: &str, courier: Option<&Courier>) -> Option<String> {
    let text = match status {
        DeliveryStatus::Pending => format!(
            "Hello! Your order #{} has been accepted. A courier will be assigned soon.",
            order_number
        ),
        DeliveryStatus::Assigned => {
            let courier = courier?;
            format!(
                "Courier assigned! {} ({}) will deliver your order #{}.",
                courier.name, courier.phone, order_number
            )
        }
        DeliveryStatus::PickedUp => format!(
            "Your order #{} has been picked up by the courier and is on its way.",
            order_number
        ),
        DeliveryStatus::InTransit => format!("Your order #{} is in transit and will arrive soon.", order_number),
        DeliveryStatus::Delivered => format!(
            "Your order #{} has been delivered. Thank you for shopping with us!",
            order_number
        ),
        DeliveryStatus::Failed => format!(
            "There was a problem delivering order #{}. Please contact us.",
            order_number
        ),
    };
    Some(text)
}

/// Sends delivery updates to the customer after a transition commits.
pub struct Notifier {
    transport: Arc<dyn NotificationTransport>,
    couriers: Arc<dyn CourierRepository>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotificationTransport>, couriers: Arc<dyn CourierRepository>) -> Self {
        Self { transport, couriers }
    }

    /// Best-effort: failures are logged and swallowed.
    pub async fn notify(&self, order: &Order, delivery: &Delivery) {
        let phone = order.customer.phone.trim();
        if phone.is_empty() {
            warn!(order_number = %order.order_number, "No phone on order, skipping notification");
            return;
        }

        let courier = match delivery.courier_id {
            Some(id) => match self.couriers.get_courier(id).await {
                Ok(courier) => courier,
                Err(e) => {
                    error!(order_number = %order.order_number, "Failed to load courier for notification: {}", e);
                    None
                }
            },
            None => None,
        };

        let Some(message) = render_message(delivery.status, &order.order_number, courier.as_ref()) else {
            warn!(
                order_number = %order.order_number,
                status = delivery.status.as_str(),
                "No courier attached, skipping notification"
            );
            return;
        };

        match self.transport.send(phone, &message).await {
            Ok(()) => info!(
                order_number = %order.order_number,
                phone = %Masked(phone),
                status = delivery.status.as_str(),
                "Delivery notification sent"
            ),
            Err(e) => error!(
                order_number = %order.order_number,
                phone = %Masked(phone),
                "Delivery notification failed: {}",
                e
            ),
        }
    }
}

/// Sandbox transport: writes the message to the log instead of sending it.
pub struct LogTransport {
    sender_name: String,
}

impl LogTransport {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self { sender_name: sender_name.into() }
    }
}

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        info!(to = %Masked(phone), from = %self.sender_name, text = message, "SMS (mock)");
        Ok(())
    }
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    api_key: &'a str,
    sender: &'a str,
    phone: &'a str,
    message: &'a str,
}

/// Posts messages to an HTTP SMS provider.
pub struct HttpSmsTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_name: String,
}

impl HttpSmsTransport {
    pub fn new(api_url: String, api_key: String, sender_name: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, api_url, api_key, sender_name })
    }
}

#[async_trait]
impl NotificationTransport for HttpSmsTransport {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        let payload = SmsPayload {
            api_key: &self.api_key,
            sender: &self.sender_name,
            phone,
            message,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_carry_order_number() {
        for status in DeliveryStatus::ALL {
            if status == DeliveryStatus::Assigned {
                continue;
            }
            let text = render_message(status, "OLR2603070905", None).unwrap();
            assert!(text.contains("#OLR2603070905"), "{}", text);
        }
    }

    #[test]
    fn test_assigned_template_names_courier() {
        let courier = Courier::new("Rashad".to_string(), "+994501234567".to_string(), "Car".to_string());

        let text = render_message(DeliveryStatus::Assigned, "OLR1", Some(&courier)).unwrap();

        assert_eq!(text, "Courier assigned! Rashad (+994501234567) will deliver your order #OLR1.");
        assert!(render_message(DeliveryStatus::Assigned, "OLR1", None).is_none());
    }

    #[test]
    fn test_pending_template() {
        assert_eq!(
            render_message(DeliveryStatus::Pending, "OLR7", None).unwrap(),
            "Hello! Your order #OLR7 has been accepted. A courier will be assigned soon."
        );
    }
}
