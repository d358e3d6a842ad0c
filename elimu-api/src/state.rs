use elimu_catalog::CatalogReader;
use elimu_core::blob::BlobStore;
use elimu_order::{DownloadGatekeeper, LedgerStore, OrderLedger, PaymentGateway, PaymentReconciler};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LedgerStore>,
    pub ledger: Arc<OrderLedger>,
    pub gateway: Arc<PaymentGateway>,
    pub reconciler: Arc<PaymentReconciler>,
    pub gatekeeper: Arc<DownloadGatekeeper>,
    pub catalog: Arc<dyn CatalogReader>,
    pub blobs: Arc<dyn BlobStore>,
}
