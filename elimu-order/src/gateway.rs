use crate::models::{Order, OrderStatus, Payment, PaymentMethod};
use crate::store::LedgerStore;
use elimu_core::payment::{
    ChargeRequest, OutcomeKind, PaymentOutcome, PaymentProvider, PaymentStatus, ProviderError,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("order is not pending (status {0})")]
    OrderNotPending(String),

    #[error("another payment for this order is already in progress")]
    PaymentInProgress,

    #[error("payment initiation failed: {0}")]
    InitiationFailed(String),

    #[error("payment has no in-flight charge to poll")]
    NotPollable,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Translates internal payment initiation into provider calls and provider
/// answers back into normalized outcomes. Never applies outcomes itself;
/// that is the reconciler's job.
pub struct PaymentGateway {
    store: Arc<LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentGateway {
    pub fn new(store: Arc<LedgerStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, provider }
    }

    /// Start a charge for a pending order. On any initiation failure the
    /// payment row is closed as failed and the order stays pending, so the
    /// customer can retry with a fresh payment.
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        msisdn: &str,
    ) -> Result<Payment, GatewayError> {
        // Reserve the payment slot under the write lock: the pending-status
        // check and the open-payment check must be atomic with the insert,
        // otherwise two concurrent initiations both pass the guard.
        let (payment_id, order) = {
            let mut state = self.store.write().await;
            let order = state
                .order(&order_id)
                .cloned()
                .ok_or(GatewayError::OrderNotFound(order_id))?;
            if order.status != OrderStatus::Pending {
                return Err(GatewayError::OrderNotPending(format!("{:?}", order.status)));
            }
            if state.has_open_payment(&order_id) {
                return Err(GatewayError::PaymentInProgress);
            }

            let payment = Payment::new(order_id, order.total_cents, method);
            let payment_id = payment.id;
            state.insert_payment(payment);
            (payment_id, order)
        };

        let req = charge_request(&order, msisdn);
        match self.provider.initiate_charge(&req).await {
            Ok(handle) => {
                let mut state = self.store.write().await;
                // Re-check the order under the lock: a cancel may have landed
                // while the push was in flight (the payment was still Pending,
                // so the cancel guard let it through). The charge must not be
                // confirmed against a closed order.
                let order_status = state
                    .order(&order_id)
                    .map(|o| o.status)
                    .ok_or(GatewayError::OrderNotFound(order_id))?;

                state.index_correlation(handle.correlation_id.clone(), payment_id);
                let payment = state
                    .payment_mut(&payment_id)
                    .ok_or(GatewayError::PaymentNotFound(payment_id))?;
                payment.correlation_id = Some(handle.correlation_id.clone());

                if order_status != OrderStatus::Pending {
                    payment.status = PaymentStatus::Failed;
                    payment.failure_reason =
                        Some("order closed before charge was confirmed".to_string());
                    tracing::warn!(
                        payment_id = %payment_id,
                        order_id = %order_id,
                        order_status = ?order_status,
                        "order closed mid-initiation; charge abandoned"
                    );
                    return Err(GatewayError::OrderNotPending(format!("{:?}", order_status)));
                }

                payment.status = PaymentStatus::Processing;
                tracing::info!(
                    payment_id = %payment_id,
                    order_id = %order_id,
                    correlation_id = %handle.correlation_id,
                    "charge initiated"
                );
                Ok(payment.clone())
            }
            Err(e) => {
                let mut state = self.store.write().await;
                if let Some(payment) = state.payment_mut(&payment_id) {
                    payment.status = PaymentStatus::Failed;
                    payment.failure_reason = Some(e.to_string());
                }
                tracing::warn!(
                    payment_id = %payment_id,
                    order_id = %order_id,
                    error = %e,
                    "charge initiation failed"
                );
                Err(GatewayError::InitiationFailed(e.to_string()))
            }
        }
    }

    /// Synchronous status fallback for a processing payment. A provider
    /// timeout or network error maps to an indeterminate outcome: safe to
    /// poll again, never treated as failure.
    pub async fn poll_status(&self, payment_id: Uuid) -> Result<PaymentOutcome, GatewayError> {
        let correlation_id = {
            let state = self.store.read().await;
            let payment = state
                .payment(&payment_id)
                .ok_or(GatewayError::PaymentNotFound(payment_id))?;
            payment
                .correlation_id
                .clone()
                .ok_or(GatewayError::NotPollable)?
        };

        match self.provider.query_status(&correlation_id).await {
            Ok(outcome) => Ok(outcome),
            Err(ProviderError::Timeout) | Err(ProviderError::Network(_)) => Ok(PaymentOutcome {
                correlation_id,
                kind: OutcomeKind::Indeterminate,
                provider_receipt: None,
                amount_cents: None,
                description: Some("status query did not settle".to_string()),
            }),
            Err(e) => Err(GatewayError::Provider(e)),
        }
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, GatewayError> {
        self.store
            .read()
            .await
            .payment(&payment_id)
            .cloned()
            .ok_or(GatewayError::PaymentNotFound(payment_id))
    }
}

fn charge_request(order: &Order, msisdn: &str) -> ChargeRequest {
    ChargeRequest {
        amount_cents: order.total_cents,
        msisdn: msisdn.to_string(),
        account_reference: format!("ORDER_{}", order.order_number),
        description: format!("Elimu Materials - Order {}", order.order_number),
    }
}
