use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use elimu_order::{DownloadEntitlement, Order, OrderLine, Payment};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/checkout", get(checkout_details))
        .route("/v1/orders/{id}/process-free", post(process_free_order))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: String,
}

/// Everything the checkout page needs in one read.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub is_free: bool,
    pub payments: Vec<Payment>,
    pub entitlements: Vec<DownloadEntitlement>,
}

/// POST /v1/orders
async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let lines: Vec<OrderLine> = req
        .items
        .iter()
        .map(|i| OrderLine {
            product_id: i.product_id,
            quantity: i.quantity,
        })
        .collect();

    let order = state.ledger.create_order(&req.user_id, &lines).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders?user_id=...
async fn list_orders(
    State(state): State<AppState>,
    Query(q): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    Json(state.ledger.list_orders(&q.user_id).await)
}

/// GET /v1/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.ledger.get_order(order_id).await?))
}

/// POST /v1/orders/{id}/cancel
async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.ledger.cancel(order_id).await?))
}

/// GET /v1/orders/{id}/checkout
async fn checkout_details(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let guard = state.store.read().await;
    let order = guard
        .order(&order_id)
        .cloned()
        .ok_or_else(|| AppError::NotFoundError(format!("order not found: {order_id}")))?;
    let payments = guard.payments_for_order(&order_id);
    let entitlements = guard.entitlements_for_order(&order_id);

    let is_free = order.is_free();
    Ok(Json(CheckoutResponse {
        order,
        is_free,
        payments,
        entitlements,
    }))
}

/// POST /v1/orders/{id}/process-free
async fn process_free_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.ledger.mark_free_order_paid(order_id).await?))
}
