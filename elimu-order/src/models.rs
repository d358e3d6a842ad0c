use elimu_core::payment::PaymentStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// The single source of truth for a customer's purchase.
///
/// Totals are integer minor-currency units (cents of KES), computed once at
/// creation from the snapshotted item prices and never recomputed after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-facing sequential-looking number, distinct from the id.
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: String, order_number: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_number,
            user_id,
            items: Vec::new(),
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            currency: "KES".to_string(),
            status: OrderStatus::Pending,
            payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add an item and fold it into the totals. Tax is carried but fixed at
    /// zero for digital goods.
    pub fn add_item(&mut self, item: OrderItem) {
        self.subtotal_cents += item.line_total_cents();
        self.total_cents = self.subtotal_cents + self.tax_cents;
        self.items.push(item);
        self.updated_at = Utc::now();
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    pub fn is_free(&self) -> bool {
        self.total_cents == 0
    }
}

/// An individual product within an order. Title, price and content ref are
/// copied from the catalog at order time so later catalog changes never
/// retroactively alter a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub content_ref: String,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(
        order_id: Uuid,
        product_id: Uuid,
        product_title: String,
        unit_price_cents: i64,
        quantity: u32,
        content_ref: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            product_title,
            unit_price_cents,
            quantity,
            content_ref,
            created_at: Utc::now(),
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity as i64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Mpesa,
    Card,
}

/// A single payment attempt against an order. Owned by the order but kept
/// with independent identity for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    /// Provider-assigned id for the attempt (CheckoutRequestID).
    pub correlation_id: Option<String>,
    /// Provider receipt on success (M-Pesa receipt number).
    pub provider_receipt: Option<String>,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(order_id: Uuid, amount_cents: i64, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount_cents,
            currency: "KES".to_string(),
            method,
            correlation_id: None,
            provider_receipt: None,
            status: PaymentStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// The right to download one purchased item, bounded by a count and an
/// expiry. At most one per order item, minted only once the order is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntitlement {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub content_ref: String,
    /// Unguessable access token; the only handle a requester ever holds.
    pub token: String,
    pub remaining: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DownloadEntitlement {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadOutcome {
    Success,
    Denied,
}

/// Requester fingerprint distilled from the User-Agent header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
    pub browser_family: String,
    pub os_family: String,
    pub device_family: String,
    pub is_mobile: bool,
    pub is_bot: bool,
}

/// Append-only audit record for a download attempt. Never mutated or
/// deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub id: Uuid,
    pub entitlement_id: Uuid,
    pub at: DateTime<Utc>,
    pub client: ClientInfo,
    pub outcome: DownloadOutcome,
    /// Precise reason ("expired", "limit_exceeded") even when the caller
    /// only sees the uniform denial message.
    pub reason: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_snapshotted_prices() {
        let mut order = Order::new("teacher@example.com".to_string(), "10293847".to_string());
        let id = order.id;
        order.add_item(OrderItem::new(
            id,
            Uuid::new_v4(),
            "Grade 6 Science Notes".to_string(),
            1500,
            2,
            "blob/sci-6".to_string(),
        ));
        order.add_item(OrderItem::new(
            id,
            Uuid::new_v4(),
            "KCPE Revision Set".to_string(),
            500,
            1,
            "blob/kcpe".to_string(),
        ));

        assert_eq!(order.subtotal_cents, 3500);
        assert_eq!(order.tax_cents, 0);
        assert_eq!(order.total_cents, 3500);
    }

    #[test]
    fn entitlement_inertness_checks() {
        let now = Utc::now();
        let ent = DownloadEntitlement {
            id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            content_ref: "blob/x".to_string(),
            token: "t".to_string(),
            remaining: 0,
            issued_at: now,
            expires_at: now + chrono::Duration::days(30),
        };
        assert!(ent.is_exhausted());
        assert!(!ent.is_expired(now));
        assert!(ent.is_expired(now + chrono::Duration::days(31)));
    }
}
