use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use elimu_api::{app, AppState};
use elimu_catalog::{InMemoryCatalog, Product};
use elimu_core::payment::{
    ChargeHandle, ChargeRequest, PaymentOutcome, PaymentProvider, ProviderError,
};
use elimu_order::{
    DownloadGatekeeper, EntitlementIssuer, LedgerStore, OrderLedger, PaymentGateway,
    PaymentReconciler,
};
use elimu_store::blob::InMemoryBlobStore;

/// Provider stub that always accepts the push and never settles a query,
/// so settlement only ever arrives through the callback route.
struct AcceptingProvider;

#[async_trait]
impl PaymentProvider for AcceptingProvider {
    async fn initiate_charge(&self, _req: &ChargeRequest) -> Result<ChargeHandle, ProviderError> {
        Ok(ChargeHandle {
            correlation_id: format!("ws_CO_{}", Uuid::new_v4().simple()),
            merchant_request_id: Some("29115-34620561-1".to_string()),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }

    async fn query_status(&self, _correlation_id: &str) -> Result<PaymentOutcome, ProviderError> {
        Err(ProviderError::Timeout)
    }
}

async fn test_app() -> (Router, Arc<InMemoryCatalog>, Arc<InMemoryBlobStore>) {
    let store = Arc::new(LedgerStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let issuer = EntitlementIssuer::new(5, 30);

    let state = AppState {
        store: store.clone(),
        ledger: Arc::new(OrderLedger::new(
            store.clone(),
            catalog.clone(),
            issuer.clone(),
        )),
        gateway: Arc::new(PaymentGateway::new(store.clone(), Arc::new(AcceptingProvider))),
        reconciler: Arc::new(PaymentReconciler::new(store.clone(), issuer)),
        gatekeeper: Arc::new(DownloadGatekeeper::new(store)),
        catalog: catalog.clone(),
        blobs: blobs.clone(),
    };
    (app(state), catalog, blobs)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn success_callback(correlation_id: &str, amount_kes: f64) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": correlation_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": amount_kes },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "PhoneNumber", "Value": 254712345678u64 }
                    ]
                }
            }
        }
    })
}

#[tokio::test]
async fn full_purchase_and_download_flow() {
    let (app, catalog, blobs) = test_app().await;
    let pid = catalog
        .insert(Product::new("Form 2 Physics Notes", 1500, "materials/phy-2.pdf"))
        .await;
    blobs
        .put("materials/phy-2.pdf", b"%PDF-1.4 physics".to_vec())
        .await;

    // Place the order.
    let (status, order) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({
            "user_id": "teacher@example.com",
            "items": [{ "product_id": pid, "quantity": 1 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total_cents"], 1500);
    let order_id = order["id"].as_str().unwrap().to_string();

    // Start the STK push.
    let (status, payment) = send(
        &app,
        "POST",
        "/v1/payments/initiate",
        Some(json!({ "order_id": order_id, "phone_number": "0712345678" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "PROCESSING");
    let correlation_id = payment["correlation_id"].as_str().unwrap().to_string();

    // Cancel is rejected once the push is in flight.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/cancel"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Provider confirms via callback; duplicate delivery is harmless.
    for _ in 0..2 {
        let (status, ack) = send(
            &app,
            "POST",
            "/v1/payments/mpesa/callback",
            Some(success_callback(&correlation_id, 15.0)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["ResultCode"], 0);
    }

    // Exactly one entitlement, order paid.
    let (status, checkout) = send(
        &app,
        "GET",
        &format!("/v1/orders/{order_id}/checkout"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checkout["order"]["status"], "PAID");
    assert_eq!(checkout["payments"][0]["status"], "COMPLETED");
    assert_eq!(
        checkout["payments"][0]["provider_receipt"],
        "NLJ7RT61SV"
    );
    assert_eq!(checkout["entitlements"].as_array().unwrap().len(), 1);
    let token = checkout["entitlements"][0]["token"].as_str().unwrap().to_string();

    // Five downloads succeed, the sixth is gone.
    for i in 0..5 {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/v1/downloads/{token}"))
            .header("user-agent", "Mozilla/5.0 (Linux; Android 13) Chrome/120 Mobile")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let remaining = response
            .headers()
            .get("x-downloads-remaining")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(remaining, (4 - i).to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4 physics");
    }

    let (status, body) = send(&app, "GET", &format!("/v1/downloads/{token}"), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "download link has expired or exceeded limit");
}

#[tokio::test]
async fn cancelled_push_closes_the_order() {
    let (app, catalog, _blobs) = test_app().await;
    let pid = catalog
        .insert(Product::new("KCSE Revision Set", 2500, "materials/kcse.pdf"))
        .await;

    let (_, order) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({
            "user_id": "parent@example.com",
            "items": [{ "product_id": pid, "quantity": 1 }]
        })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, payment) = send(
        &app,
        "POST",
        "/v1/payments/initiate",
        Some(json!({ "order_id": order_id, "phone_number": "+254712345678" })),
    )
    .await;
    let correlation_id = payment["correlation_id"].as_str().unwrap().to_string();
    let payment_id = payment["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/v1/payments/mpesa/callback",
        Some(json!({
            "Body": {
                "stkCallback": {
                    "CheckoutRequestID": correlation_id,
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/payments/{payment_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "CANCELLED");
    assert_eq!(body["order_status"], "CANCELLED");

    // No entitlements, and a late success cannot resurrect the order.
    let (_, _) = send(
        &app,
        "POST",
        "/v1/payments/mpesa/callback",
        Some(success_callback(&correlation_id, 25.0)),
    )
    .await;
    let (_, checkout) = send(
        &app,
        "GET",
        &format!("/v1/orders/{order_id}/checkout"),
        None,
    )
    .await;
    assert_eq!(checkout["order"]["status"], "CANCELLED");
    assert!(checkout["entitlements"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn free_order_skips_payment_entirely() {
    let (app, catalog, blobs) = test_app().await;
    let pid = catalog
        .insert(Product::new("Free Sample Chapter", 0, "materials/sample.pdf"))
        .await;
    blobs.put("materials/sample.pdf", b"sample".to_vec()).await;

    let (_, order) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({
            "user_id": "student@example.com",
            "items": [{ "product_id": pid, "quantity": 1 }]
        })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, paid) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/process-free"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "PAID");

    let (_, checkout) = send(
        &app,
        "GET",
        &format!("/v1/orders/{order_id}/checkout"),
        None,
    )
    .await;
    assert!(checkout["payments"].as_array().unwrap().is_empty());
    let token = checkout["entitlements"][0]["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "GET", &format!("/v1/downloads/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn free_processing_rejects_paid_carts() {
    let (app, catalog, _blobs) = test_app().await;
    let pid = catalog
        .insert(Product::new("Term 3 Exams", 2000, "materials/exams.pdf"))
        .await;

    let (_, order) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({
            "user_id": "u",
            "items": [{ "product_id": pid, "quantity": 1 }]
        })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/process-free"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "order requires payment");
}

#[tokio::test]
async fn validation_and_lookup_errors() {
    let (app, _catalog, _blobs) = test_app().await;

    // Empty cart.
    let (status, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({ "user_id": "u", "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown product.
    let (status, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(json!({
            "user_id": "u",
            "items": [{ "product_id": Uuid::new_v4(), "quantity": 1 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown order.
    let (status, _) = send(
        &app,
        "GET",
        &format!("/v1/orders/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Unknown download token.
    let (status, _) = send(&app, "GET", "/v1/downloads/deadbeef", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
