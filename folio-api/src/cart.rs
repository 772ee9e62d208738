use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use folio_core::Order;
use folio_order::{CartSummary, CheckoutRequest};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::CartIdentity, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub book_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Replace the line's quantity instead of adding to it
    #[serde(default)]
    pub update_quantity: bool,
}

fn default_quantity() -> u32 { 1 }

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cart", get(get_cart).delete(clear_cart))
        .route("/v1/cart/items", post(add_item))
        .route("/v1/cart/items/{book_id}", delete(remove_item))
        .route("/v1/cart/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/v1/checkout", post(checkout))
}

/// GET /v1/cart
/// A login presenting its old session key absorbs the anonymous cart here.
async fn get_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
) -> Result<Json<CartSummary>, AppError> {
    let cart = state
        .carts
        .resolve(&identity.owner, identity.anonymous_key.as_deref())
        .await?;
    Ok(Json(state.carts.price(&cart).await?))
}

async fn clear_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
) -> Result<Json<CartSummary>, AppError> {
    Ok(Json(state.carts.clear(&identity.owner).await?))
}

async fn add_item(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartSummary>, AppError> {
    let summary = state
        .carts
        .add(&identity.owner, req.book_id, req.quantity, req.update_quantity)
        .await?;
    Ok(Json(summary))
}

async fn remove_item(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<CartSummary>, AppError> {
    Ok(Json(state.carts.remove(&identity.owner, book_id).await?))
}

async fn apply_coupon(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<CartSummary>, AppError> {
    Ok(Json(state.carts.apply_coupon(&identity.owner, &req.code).await?))
}

async fn remove_coupon(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
) -> Result<Json<CartSummary>, AppError> {
    Ok(Json(state.carts.remove_coupon(&identity.owner).await?))
}

/// POST /v1/checkout
async fn checkout(
    State(state): State<AppState>,
    Extension(identity): Extension<CartIdentity>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let cart = state
        .carts
        .resolve(&identity.owner, identity.anonymous_key.as_deref())
        .await?;
    let order = state.coordinator.checkout(cart, &req).await?;

    tracing::info!(order_number = %order.order_number, total = %order.total_amount, "Checkout completed");

    Ok((StatusCode::CREATED, Json(order)))
}
