use crate::models::{DownloadEntitlement, DownloadLogEntry, Order, Payment};
use elimu_core::payment::PaymentStatus;
use std::collections::{HashMap, HashSet};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// All mutable pipeline state behind one lock.
///
/// Orders, payments and entitlements are the only shared mutable rows in the
/// system; holding them together means every transition (payment status CAS,
/// order status, entitlement mint, counter decrement) commits as one unit
/// under a single write guard. The write guard is the per-order
/// serialization point the reconciler and gatekeeper rely on.
#[derive(Default)]
pub struct LedgerState {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    entitlements: HashMap<Uuid, DownloadEntitlement>,
    download_log: Vec<DownloadLogEntry>,
    order_numbers: HashSet<String>,
    by_correlation: HashMap<String, Uuid>,
    by_token: HashMap<String, Uuid>,
    by_item: HashMap<Uuid, Uuid>,
}

impl LedgerState {
    // ---- orders ----

    pub fn insert_order(&mut self, order: Order) {
        self.order_numbers.insert(order.order_number.clone());
        self.orders.insert(order.id, order);
    }

    pub fn order(&self, id: &Uuid) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn order_mut(&mut self, id: &Uuid) -> Option<&mut Order> {
        self.orders.get_mut(id)
    }

    pub fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn order_number_taken(&self, number: &str) -> bool {
        self.order_numbers.contains(number)
    }

    // ---- payments ----

    pub fn insert_payment(&mut self, payment: Payment) {
        if let Some(corr) = payment.correlation_id.clone() {
            self.by_correlation.insert(corr, payment.id);
        }
        self.payments.insert(payment.id, payment);
    }

    pub fn payment(&self, id: &Uuid) -> Option<&Payment> {
        self.payments.get(id)
    }

    pub fn payment_mut(&mut self, id: &Uuid) -> Option<&mut Payment> {
        self.payments.get_mut(id)
    }

    pub fn payment_by_correlation(&self, correlation_id: &str) -> Option<&Payment> {
        self.by_correlation
            .get(correlation_id)
            .and_then(|id| self.payments.get(id))
    }

    pub fn index_correlation(&mut self, correlation_id: String, payment_id: Uuid) {
        self.by_correlation.insert(correlation_id, payment_id);
    }

    /// True when some payment for the order is still pending or processing.
    pub fn has_open_payment(&self, order_id: &Uuid) -> bool {
        self.payments
            .values()
            .any(|p| p.order_id == *order_id && !p.status.is_terminal())
    }

    /// True when some payment for the order has moved to processing, i.e.
    /// an STK push is in flight and the outcome will resolve the order.
    pub fn has_processing_payment(&self, order_id: &Uuid) -> bool {
        self.payments
            .values()
            .any(|p| p.order_id == *order_id && p.status == PaymentStatus::Processing)
    }

    pub fn payments_for_order(&self, order_id: &Uuid) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| p.order_id == *order_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments
    }

    // ---- entitlements ----

    pub fn insert_entitlement(&mut self, ent: DownloadEntitlement) {
        self.by_token.insert(ent.token.clone(), ent.id);
        self.by_item.insert(ent.order_item_id, ent.id);
        self.entitlements.insert(ent.id, ent);
    }

    pub fn entitlement_for_item(&self, order_item_id: &Uuid) -> Option<&DownloadEntitlement> {
        self.by_item
            .get(order_item_id)
            .and_then(|id| self.entitlements.get(id))
    }

    pub fn entitlement_by_token(&self, token: &str) -> Option<&DownloadEntitlement> {
        self.by_token.get(token).and_then(|id| self.entitlements.get(id))
    }

    pub fn entitlement_by_token_mut(&mut self, token: &str) -> Option<&mut DownloadEntitlement> {
        let id = *self.by_token.get(token)?;
        self.entitlements.get_mut(&id)
    }

    pub fn entitlements_for_order(&self, order_id: &Uuid) -> Vec<DownloadEntitlement> {
        let Some(order) = self.orders.get(order_id) else {
            return Vec::new();
        };
        order
            .items
            .iter()
            .filter_map(|item| self.entitlement_for_item(&item.id))
            .cloned()
            .collect()
    }

    // ---- download log ----

    pub fn append_log(&mut self, entry: DownloadLogEntry) {
        self.download_log.push(entry);
    }

    pub fn log_for_entitlement(&self, entitlement_id: &Uuid) -> Vec<DownloadLogEntry> {
        self.download_log
            .iter()
            .filter(|e| e.entitlement_id == *entitlement_id)
            .cloned()
            .collect()
    }
}

/// Shared handle to the ledger state.
pub struct LedgerStore {
    inner: RwLock<LedgerState>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.write().await
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}
