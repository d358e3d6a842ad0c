use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use elimu_order::{gateway::GatewayError, ledger::OrderError, reconciler::ReconcileError, DownloadError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    PaymentRequiredError(String),
    GoneError(String),
    UpstreamError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequiredError(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::GoneError(msg) => (StatusCode::GONE, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            OrderError::EmptyOrder
            | OrderError::InvalidQuantity(_)
            | OrderError::ProductUnavailable(_) => AppError::ValidationError(err.to_string()),
            OrderError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
            OrderError::PaymentRequired => AppError::PaymentRequiredError(err.to_string()),
            OrderError::Catalog(e) => AppError::Anyhow(e.into()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::OrderNotFound(_) | GatewayError::PaymentNotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            GatewayError::OrderNotPending(_)
            | GatewayError::PaymentInProgress
            | GatewayError::NotPollable => AppError::ConflictError(err.to_string()),
            GatewayError::InitiationFailed(_) | GatewayError::Provider(_) => {
                AppError::UpstreamError(err.to_string())
            }
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownCorrelation(_) => AppError::NotFoundError(err.to_string()),
            ReconcileError::OrderMissing(_) => AppError::Anyhow(err.into()),
        }
    }
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::InvalidToken => AppError::NotFoundError(err.to_string()),
            DownloadError::LinkExpired => AppError::GoneError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
