use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use folio_core::payment::GatewayRedirect;
use folio_core::{Delivery, Order, Payment, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{error::AppError, middleware::CartIdentity, state::AppState};

// ============================================================================
// Response Types
// ============================================================================

/// Payment as shown to the customer; raw gateway data stays internal
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_id: Option<String>,
    pub error_message: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            status: p.status,
            amount: p.amount,
            currency: p.currency,
            transaction_id: p.transaction_id,
            error_message: p.error_message,
            completed_at: p.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub order: Order,
    pub payment: Option<PaymentView>,
    pub delivery: Option<Delivery>,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{order_number}", get(get_order))
        .route("/v1/orders/{order_number}/pay", post(pay_order))
}

/// Orders placed by a signed-in customer are only visible to that customer.
async fn load_visible(state: &AppState, identity: &CartIdentity, order_number: &str) -> Result<Order, AppError> {
    state
        .orders
        .get_order_by_number(order_number)
        .await?
        .filter(|o| o.customer.user_id.is_none() || o.customer.user_id == identity.user_id())
        .ok_or_else(|| AppError::NotFoundError(format!("Order {}", order_number)))
}

/// GET /v1/orders/{order_number}
async fn get_order(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = load_visible(&state, &identity, &order_number).await?;
    let payment = state.payments.payment_for_order(&order).await?;
    let delivery = state.orders.get_delivery(order.id).await?;

    Ok(Json(OrderDetailResponse {
        order,
        payment: payment.map(PaymentView::from),
        delivery,
    }))
}

/// POST /v1/orders/{order_number}/pay
async fn pay_order(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Path(order_number): Path<String>,
) -> Result<Json<GatewayRedirect>, AppError> {
    let order = load_visible(&state, &identity, &order_number).await?;
    let redirect = state.payments.create_payment(&order).await?;
    Ok(Json(redirect))
}
