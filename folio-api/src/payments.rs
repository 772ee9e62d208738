use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use folio_core::payment::GatewayCallback;
use folio_core::{CoreError, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct MockPaymentPage {
    pub transaction_id: String,
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub success_url: String,
    pub fail_url: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub outcome: &'static str,
    pub order_number: String,
    pub payment_status: PaymentStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/mock/{transaction_id}", get(mock_payment_page))
        .route("/v1/payments/callback", get(callback_query).post(callback_form))
}

fn callback_url(transaction_id: &str, status: &str) -> String {
    format!("/v1/payments/callback?transaction_id={}&status={}", transaction_id, status)
}

/// GET /v1/payments/mock/{transaction_id}
/// Data for the sandbox page that stands in for the hosted gateway.
async fn mock_payment_page(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<MockPaymentPage>, AppError> {
    let (payment, order) = state.payments.describe_transaction(&transaction_id).await?;

    Ok(Json(MockPaymentPage {
        success_url: callback_url(&transaction_id, GatewayCallback::SUCCESS),
        fail_url: callback_url(&transaction_id, "fail"),
        transaction_id,
        order_number: order.order_number,
        amount: payment.amount,
        currency: payment.currency,
        payment_status: payment.status,
    }))
}

/// GET /v1/payments/callback (browser return)
async fn callback_query(
    State(state): State<AppState>,
    Query(fields): Query<BTreeMap<String, String>>,
) -> Response {
    reconcile(&state, fields).await
}

/// POST /v1/payments/callback (server-to-server notification, form encoded)
async fn callback_form(
    State(state): State<AppState>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> Response {
    reconcile(&state, fields).await
}

async fn reconcile(state: &AppState, fields: BTreeMap<String, String>) -> Response {
    let callback = GatewayCallback::from_fields(fields);
    tracing::info!(transaction_id = %callback.transaction_id, status = %callback.status, "Payment callback received");

    match state.payments.reconcile(&callback).await {
        Ok(outcome) => {
            let label = if !outcome.applied {
                "already_completed"
            } else {
                outcome.payment.status.as_str()
            };
            Json(CallbackResponse {
                outcome: label,
                order_number: outcome.order.order_number,
                payment_status: outcome.payment.status,
            })
            .into_response()
        }
        Err(CoreError::NotFoundError(msg)) => {
            tracing::warn!(transaction_id = %callback.transaction_id, "Callback for unknown transaction");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "outcome": "not_found", "error": msg })),
            )
                .into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}
