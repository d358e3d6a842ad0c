use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::error::AppError;
use crate::state::AppState;
use elimu_order::models::ClientInfo;
use elimu_order::RequestContext;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/downloads/{token}", get(download))
}

/// GET /v1/downloads/{token}
///
/// The token is the only credential; no session required. One successful
/// response consumes one download.
async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let ctx = RequestContext::new(client_info(&headers));
    let grant = state.gatekeeper.resolve(&token, &ctx).await?;

    let bytes = state
        .blobs
        .fetch(&grant.content_ref)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?;

    let filename = grant
        .content_ref
        .rsplit('/')
        .next()
        .unwrap_or("download")
        .to_string();

    let response_headers = [
        (
            header::CONTENT_TYPE,
            "application/octet-stream".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (header::CACHE_CONTROL, "no-store".to_string()),
        (
            HeaderName::from_static("x-downloads-remaining"),
            grant.remaining.to_string(),
        ),
    ];
    Ok((response_headers, bytes))
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("unknown")
        .trim()
        .to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    ClientInfo::from_user_agent(ip, user_agent)
}
