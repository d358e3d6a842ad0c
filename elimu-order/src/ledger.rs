use crate::fulfillment::EntitlementIssuer;
use crate::models::{Order, OrderItem, OrderStatus};
use crate::store::LedgerStore;
use elimu_catalog::CatalogReader;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

/// A single cart line as submitted by the customer.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found: {0}")]
    NotFound(Uuid),

    #[error("order must contain at least one item")]
    EmptyOrder,

    #[error("quantity must be greater than zero for product {0}")]
    InvalidQuantity(Uuid),

    #[error("product unavailable: {0}")]
    ProductUnavailable(Uuid),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("order requires payment")]
    PaymentRequired,

    #[error("catalog error: {0}")]
    Catalog(#[from] elimu_catalog::CatalogError),
}

/// Owns order creation and the order side of the state machine.
pub struct OrderLedger {
    store: Arc<LedgerStore>,
    catalog: Arc<dyn CatalogReader>,
    issuer: EntitlementIssuer,
}

impl OrderLedger {
    pub fn new(
        store: Arc<LedgerStore>,
        catalog: Arc<dyn CatalogReader>,
        issuer: EntitlementIssuer,
    ) -> Self {
        Self {
            store,
            catalog,
            issuer,
        }
    }

    /// Validate the cart, snapshot prices from the catalog and persist a
    /// pending order. No external side effects.
    pub async fn create_order(
        &self,
        user_id: &str,
        lines: &[OrderLine],
    ) -> Result<Order, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        for line in lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity(line.product_id));
            }
        }

        // Resolve products before taking the write lock; catalog reads are
        // a consistent snapshot per call.
        let mut snapshots = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or(OrderError::ProductUnavailable(line.product_id))?;
            snapshots.push((product, line.quantity));
        }

        let mut state = self.store.write().await;
        let order_number = {
            let mut rng = rand::thread_rng();
            loop {
                let candidate = format!("{:08}", rng.gen_range(0..100_000_000u32));
                if !state.order_number_taken(&candidate) {
                    break candidate;
                }
            }
        };

        let mut order = Order::new(user_id.to_string(), order_number);
        let order_id = order.id;
        for (product, quantity) in snapshots {
            order.add_item(OrderItem::new(
                order_id,
                product.id,
                product.title,
                product.unit_price_cents,
                quantity,
                product.content_ref,
            ));
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            "order created"
        );
        state.insert_order(order.clone());
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .read()
            .await
            .order(&order_id)
            .cloned()
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn list_orders(&self, user_id: &str) -> Vec<Order> {
        self.store.read().await.orders_for_user(user_id)
    }

    /// Cancel a pending order. Rejected once a payment has moved to
    /// processing: the in-flight outcome will resolve the order instead,
    /// which closes the cancel-vs-confirmation race.
    pub async fn cancel(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut state = self.store.write().await;

        let status = state
            .order(&order_id)
            .ok_or(OrderError::NotFound(order_id))?
            .status;
        if status != OrderStatus::Pending || state.has_processing_payment(&order_id) {
            return Err(OrderError::InvalidTransition {
                from: format!("{:?}", status),
                to: "CANCELLED".to_string(),
            });
        }

        let order = state
            .order_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;
        order.update_status(OrderStatus::Cancelled);
        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(order.clone())
    }

    /// Zero-total fast path: move the order straight to paid and mint
    /// entitlements synchronously, with no payment record at all.
    pub async fn mark_free_order_paid(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut state = self.store.write().await;

        let order = state
            .order(&order_id)
            .cloned()
            .ok_or(OrderError::NotFound(order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: format!("{:?}", order.status),
                to: "PAID".to_string(),
            });
        }
        if !order.is_free() {
            return Err(OrderError::PaymentRequired);
        }

        let now = chrono::Utc::now();
        for item in &order.items {
            self.issuer.fulfill(&mut state, &order.user_id, item, now);
        }

        let order = state
            .order_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;
        order.update_status(OrderStatus::Paid);
        order.payment_date = Some(now);
        tracing::info!(order_id = %order_id, "free order marked paid");
        Ok(order.clone())
    }
}
