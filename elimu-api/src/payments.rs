use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use elimu_core::payment::PaymentStatus;
use elimu_order::models::{OrderStatus, Payment, PaymentMethod};
use elimu_store::daraja::{self, CallbackEnvelope};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/initiate", post(initiate_payment))
        .route("/v1/payments/{id}/status", get(payment_status))
        .route("/v1/payments/mpesa/callback", post(mpesa_callback))
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub phone_number: String,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Mpesa
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment: Payment,
    pub order_status: OrderStatus,
}

/// POST /v1/payments/initiate
async fn initiate_payment(
    State(state): State<AppState>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .gateway
        .initiate_payment(req.order_id, req.method, &req.phone_number)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /v1/payments/{id}/status
///
/// Poll fallback for clients that never see the asynchronous callback. A
/// still-processing payment triggers a provider status query; any settled
/// answer is fed through the reconciler before responding, so the response
/// always reflects applied state.
async fn payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let payment = state.gateway.get_payment(payment_id).await?;

    if payment.status == PaymentStatus::Processing {
        let outcome = state.gateway.poll_status(payment_id).await?;
        state.reconciler.apply(&outcome).await?;
    }

    let payment = state.gateway.get_payment(payment_id).await?;
    let order = state.ledger.get_order(payment.order_id).await?;
    Ok(Json(PaymentStatusResponse {
        payment,
        order_status: order.status,
    }))
}

/// POST /v1/payments/mpesa/callback
///
/// Provider webhook. Always acknowledged with ResultCode 0 regardless of
/// what applying the outcome did; the provider retries on anything else and
/// the reconciler is idempotent anyway.
async fn mpesa_callback(
    State(state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope>,
) -> Json<serde_json::Value> {
    match daraja::normalize_callback(&envelope) {
        Some(outcome) => match state.reconciler.apply(&outcome).await {
            Ok(result) => {
                tracing::info!(
                    payment_id = %result.payment_id,
                    order_id = %result.order_id,
                    newly_applied = result.newly_applied,
                    "callback processed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "callback could not be applied");
            }
        },
        None => {
            tracing::warn!("callback without a CheckoutRequestID dropped");
        }
    }

    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}
