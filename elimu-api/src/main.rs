use std::net::SocketAddr;
use std::sync::Arc;

use elimu_api::{app, AppState};
use elimu_catalog::InMemoryCatalog;
use elimu_order::{
    DownloadGatekeeper, EntitlementIssuer, LedgerStore, OrderLedger, PaymentGateway,
    PaymentReconciler,
};
use elimu_store::blob::FsBlobStore;
use elimu_store::daraja::DarajaClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elimu_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = elimu_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Elimu API on port {}", config.server.port);

    let store = Arc::new(LedgerStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let blobs = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    let provider =
        Arc::new(DarajaClient::new(config.mpesa.clone()).expect("Failed to build M-Pesa client"));

    let issuer = EntitlementIssuer::new(
        config.business_rules.download_limit,
        config.business_rules.download_window_days,
    );

    let app_state = AppState {
        store: store.clone(),
        ledger: Arc::new(OrderLedger::new(
            store.clone(),
            catalog.clone(),
            issuer.clone(),
        )),
        gateway: Arc::new(PaymentGateway::new(store.clone(), provider)),
        reconciler: Arc::new(PaymentReconciler::new(store.clone(), issuer)),
        gatekeeper: Arc::new(DownloadGatekeeper::new(store)),
        catalog,
        blobs,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
