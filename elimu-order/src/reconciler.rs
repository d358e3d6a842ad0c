use crate::fulfillment::EntitlementIssuer;
use crate::models::OrderStatus;
use crate::store::LedgerStore;
use elimu_core::payment::{OutcomeKind, PaymentOutcome, PaymentStatus};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no payment matches correlation id {0}")]
    UnknownCorrelation(String),

    #[error("order not found for payment {0}")]
    OrderMissing(Uuid),
}

/// Result of applying an outcome. `newly_applied` is false when the payment
/// was already terminal and the call was a no-op.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub newly_applied: bool,
}

/// Applies a normalized payment outcome to exactly one order.
///
/// Both producers (the provider webhook and the status poller) feed this one
/// entry point; there is no other code path that settles a payment. The whole
/// transition runs under the ledger write guard, so a duplicate callback or a
/// webhook racing a poll serializes here: the first caller settles the
/// payment, every later caller observes a terminal state and returns the
/// recorded result untouched.
pub struct PaymentReconciler {
    store: Arc<LedgerStore>,
    issuer: EntitlementIssuer,
}

impl PaymentReconciler {
    pub fn new(store: Arc<LedgerStore>, issuer: EntitlementIssuer) -> Self {
        Self { store, issuer }
    }

    pub async fn apply(&self, outcome: &PaymentOutcome) -> Result<ReconcileResult, ReconcileError> {
        let mut state = self.store.write().await;

        let payment = state
            .payment_by_correlation(&outcome.correlation_id)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownCorrelation(outcome.correlation_id.clone()))?;
        let order = state
            .order(&payment.order_id)
            .cloned()
            .ok_or(ReconcileError::OrderMissing(payment.id))?;

        // Terminal states are absorbing: report what was recorded.
        if payment.status.is_terminal() {
            tracing::debug!(
                payment_id = %payment.id,
                status = ?payment.status,
                "duplicate outcome ignored"
            );
            return Ok(ReconcileResult {
                payment_id: payment.id,
                order_id: order.id,
                payment_status: payment.status,
                order_status: order.status,
                newly_applied: false,
            });
        }

        if outcome.kind == OutcomeKind::Indeterminate {
            return Ok(ReconcileResult {
                payment_id: payment.id,
                order_id: order.id,
                payment_status: payment.status,
                order_status: order.status,
                newly_applied: false,
            });
        }

        let now = chrono::Utc::now();
        // Terminal order statuses are absorbing too: an outcome arriving for
        // an already-closed order settles the payment record but never
        // rewrites the order or mints entitlements.
        let order_closed = order.status.is_terminal();
        let (payment_status, order_status) = match outcome.kind {
            OutcomeKind::Completed => {
                // Mint entitlements before any status write. Issuing is the
                // only step that could fail conceptually; staging it first
                // means a paid order without entitlements is never visible,
                // and a retried apply would find the payment still
                // processing.
                if !order_closed {
                    for item in &order.items {
                        self.issuer.fulfill(&mut state, &order.user_id, item, now);
                    }
                }
                (PaymentStatus::Completed, OrderStatus::Paid)
            }
            OutcomeKind::Failed => (PaymentStatus::Failed, OrderStatus::Failed),
            OutcomeKind::Cancelled => (PaymentStatus::Cancelled, OrderStatus::Cancelled),
            OutcomeKind::Indeterminate => unreachable!("handled above"),
        };
        let order_status = if order_closed {
            tracing::warn!(
                payment_id = %payment.id,
                order_id = %order.id,
                order_status = ?order.status,
                outcome = ?outcome.kind,
                "outcome for a closed order; order left untouched"
            );
            order.status
        } else {
            order_status
        };

        if let Some(p) = state.payment_mut(&payment.id) {
            p.status = payment_status;
            p.processed_at = Some(now);
            p.provider_receipt = outcome.provider_receipt.clone();
            if payment_status != PaymentStatus::Completed {
                p.failure_reason = outcome.description.clone();
            }
        }
        if !order_closed {
            if let Some(o) = state.order_mut(&order.id) {
                o.update_status(order_status);
                if order_status == OrderStatus::Paid {
                    o.payment_date = Some(now);
                }
            }
        }

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            payment_status = ?payment_status,
            order_status = ?order_status,
            "payment outcome applied"
        );
        Ok(ReconcileResult {
            payment_id: payment.id,
            order_id: order.id,
            payment_status,
            order_status,
            newly_applied: true,
        })
    }
}
