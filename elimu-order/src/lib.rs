pub mod fulfillment;
pub mod gatekeeper;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod reconciler;
pub mod store;

pub use fulfillment::EntitlementIssuer;
pub use gatekeeper::{DownloadError, DownloadGatekeeper, DownloadGrant, RequestContext};
pub use gateway::{GatewayError, PaymentGateway};
pub use ledger::{OrderError, OrderLedger, OrderLine};
pub use models::{
    DownloadEntitlement, DownloadLogEntry, Order, OrderItem, OrderStatus, Payment, PaymentMethod,
};
pub use reconciler::{PaymentReconciler, ReconcileError, ReconcileResult};
pub use store::LedgerStore;
