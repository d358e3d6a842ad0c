use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payment lifecycle states. Completed/Failed/Cancelled/Refunded are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }
}

/// Provider verdict for a single payment attempt, normalized at the boundary.
///
/// Indeterminate means the provider has not settled yet: safe to poll again,
/// never applied as a state change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Completed,
    Failed,
    Cancelled,
    Indeterminate,
}

/// Normalized result of an asynchronous charge, whether it arrived via
/// callback or via a synchronous status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// Provider-assigned id for the attempt (e.g. CheckoutRequestID).
    pub correlation_id: String,
    pub kind: OutcomeKind,
    /// Provider receipt on success (e.g. M-Pesa receipt number).
    pub provider_receipt: Option<String>,
    pub amount_cents: Option<i64>,
    /// Provider's human-readable result description.
    pub description: Option<String>,
}

/// Outbound request to start an asynchronous charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    /// Subscriber number, normalized by the provider adapter.
    pub msisdn: String,
    pub account_reference: String,
    pub description: String,
}

/// Provider's acknowledgement that a charge was started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeHandle {
    pub correlation_id: String,
    pub merchant_request_id: Option<String>,
    pub customer_message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider network error: {0}")]
    Network(String),
}

/// External mobile-money provider. Implementations perform blocking network
/// calls and must apply a bounded timeout.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Start an asynchronous charge (STK-push style). Returns the provider's
    /// correlation id for matching the eventual callback or poll result.
    async fn initiate_charge(&self, req: &ChargeRequest) -> Result<ChargeHandle, ProviderError>;

    /// Synchronous status query by correlation id, used as a fallback when no
    /// callback has arrived.
    async fn query_status(&self, correlation_id: &str) -> Result<PaymentOutcome, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }
}
