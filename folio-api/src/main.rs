use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use folio_api::{app, AppState, AuthConfig, Backends};
use folio_core::notify::NotificationTransport;
use folio_core::payment::PaymentGateway;
use folio_order::{HostedGateway, HostedGatewayConfig, HttpSmsTransport, LogTransport, SandboxGateway};
use folio_store::app_config::{Config, PaymentMode, SmsMode};
use folio_store::{DbClient, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "folio_api=debug,folio_order=debug,folio_store=info,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Folio API on port {}", config.server.port);

    let (backends, settings) = if config.database.url.is_empty() {
        tracing::warn!("No database configured, using the in-memory store");
        (Backends::memory(Arc::new(MemoryStore::new())), config.checkout.clone())
    } else {
        let db = DbClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await.context("Failed to run migrations")?;
        let settings = db
            .fetch_checkout_settings(config.checkout.clone())
            .await
            .context("Failed to load store settings")?;
        (Backends::postgres(&db), settings)
    };
    tracing::info!(
        shipping_cost = %settings.shipping_cost,
        currency = %settings.currency,
        "Checkout settings loaded"
    );

    let gateway: Arc<dyn PaymentGateway> = match config.payment.mode {
        PaymentMode::Sandbox => Arc::new(SandboxGateway::new(config.payment.public_base_url.clone())),
        PaymentMode::Production => Arc::new(
            HostedGateway::new(HostedGatewayConfig {
                api_url: config.payment.api_url.clone(),
                merchant_id: config.payment.merchant_id.clone(),
                secret_key: config.payment.secret_key.clone(),
                callback_url: config.payment.callback_url.clone(),
            })
            .context("Failed to build payment gateway")?,
        ),
    };

    let transport: Arc<dyn NotificationTransport> = match config.sms.mode {
        SmsMode::Mock => Arc::new(LogTransport::new(config.sms.sender_name.clone())),
        SmsMode::Http => Arc::new(
            HttpSmsTransport::new(
                config.sms.api_url.clone(),
                config.sms.api_key.clone(),
                config.sms.sender_name.clone(),
            )
            .context("Failed to build SMS transport")?,
        ),
    };

    let app_state = AppState::new(
        backends,
        settings,
        gateway,
        transport,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.session_expiration_seconds,
        },
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
