use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use folio_core::{Courier, Delivery, Order, OrderStatus, Payment, RejectReason};
use folio_order::TransitionOutcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub full_name: String,
    pub city: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub item_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            order_number: o.order_number.clone(),
            full_name: o.customer.full_name.clone(),
            city: o.customer.city.clone(),
            total_amount: o.total_amount,
            status: o.status,
            item_count: o.total_quantity(),
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardOrderDetail {
    pub order: Order,
    pub delivery: Option<Delivery>,
    pub payment: Option<Payment>,
    /// Candidates for assignment
    pub couriers: Vec<Courier>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignCourierRequest {
    /// None removes the current courier
    pub courier_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListCouriersQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCourierRequest {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub vehicle_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/dashboard/orders", get(list_orders))
        .route("/v1/dashboard/orders/{id}", get(get_order))
        .route("/v1/dashboard/orders/{id}/status", post(set_status))
        .route("/v1/dashboard/orders/{id}/courier", post(assign_courier))
        .route("/v1/dashboard/couriers", get(list_couriers).post(register_courier))
        .route("/v1/dashboard/couriers/{id}/active", post(set_courier_active))
}

/// GET /v1/dashboard/orders?status=
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderSummary>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<OrderStatus>()
                .map_err(|e| AppError::validation(RejectReason::InvalidStatus.code(), e.to_string()))?,
        ),
        None => None,
    };

    let orders = state.orders.list_orders(status).await?;
    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

/// GET /v1/dashboard/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DashboardOrderDetail>, AppError> {
    let order = state
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Order {}", id)))?;
    let delivery = state.orders.get_delivery(id).await?;
    let payment = state.payments.payment_for_order(&order).await?;
    let couriers = state.couriers.list_couriers(true).await?;

    Ok(Json(DashboardOrderDetail { order, delivery, payment, couriers }))
}

/// POST /v1/dashboard/orders/{id}/status
async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    Ok(Json(state.lifecycle.set_order_status(id, &req.status).await?))
}

/// POST /v1/dashboard/orders/{id}/courier
async fn assign_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignCourierRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    Ok(Json(state.lifecycle.assign_courier(id, req.courier_id).await?))
}

async fn list_couriers(
    State(state): State<AppState>,
    Query(query): Query<ListCouriersQuery>,
) -> Result<Json<Vec<Courier>>, AppError> {
    let couriers = state.couriers.list_couriers(query.active_only).await?;
    Ok(Json(couriers))
}

async fn register_courier(
    State(state): State<AppState>,
    Json(req): Json<RegisterCourierRequest>,
) -> Result<(StatusCode, Json<Courier>), AppError> {
    let name = req.name.trim();
    let phone = req.phone.trim();
    if name.is_empty() || phone.is_empty() {
        return Err(AppError::validation("invalid_courier", "name and phone are required"));
    }

    let courier = Courier::new(name.to_string(), phone.to_string(), req.vehicle_type.trim().to_string());
    state.couriers.create_courier(&courier).await?;
    tracing::info!(courier_id = %courier.id, name = %courier.name, "Courier registered");

    Ok((StatusCode::CREATED, Json(courier)))
}

async fn set_courier_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<Courier>, AppError> {
    state.couriers.set_courier_active(id, req.is_active).await?;
    let courier = state
        .couriers
        .get_courier(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Courier {}", id)))?;
    Ok(Json(courier))
}
