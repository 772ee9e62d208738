use async_trait::async_trait;

/// Outbound text-message channel to customers
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMS transport failed: {0}")]
    Transport(String),
    #[error("SMS provider rejected message: {0}")]
    Rejected(String),
}
