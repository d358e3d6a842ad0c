use crate::models::{DownloadEntitlement, OrderItem};
use crate::store::LedgerState;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Mints download entitlements for paid order items.
///
/// Idempotent by construction: an item that already has an entitlement gets
/// the existing one back unchanged. Callers invoke this only for items of a
/// paid order, inside the same write guard that flips the order status, so a
/// paid order without entitlements is never observable.
#[derive(Clone)]
pub struct EntitlementIssuer {
    download_limit: u32,
    window: Duration,
}

impl EntitlementIssuer {
    pub fn new(download_limit: u32, window_days: i64) -> Self {
        Self {
            download_limit,
            window: Duration::days(window_days),
        }
    }

    pub fn fulfill(
        &self,
        state: &mut LedgerState,
        user_id: &str,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> DownloadEntitlement {
        if let Some(existing) = state.entitlement_for_item(&item.id) {
            return existing.clone();
        }

        let ent = DownloadEntitlement {
            id: Uuid::new_v4(),
            order_item_id: item.id,
            content_ref: item.content_ref.clone(),
            token: generate_download_token(user_id, &item.product_id),
            remaining: self.download_limit,
            issued_at: now,
            expires_at: now + self.window,
        };
        tracing::info!(
            entitlement_id = %ent.id,
            order_item_id = %item.id,
            expires_at = %ent.expires_at,
            "entitlement minted"
        );
        state.insert_entitlement(ent.clone());
        ent
    }
}

/// SHA-256 over user, product, issue time and a random nonce. The nonce makes
/// the token unguessable even when the other inputs are known.
pub fn generate_download_token(user_id: &str, product_id: &Uuid) -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill(&mut nonce);

    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(product_id.as_bytes());
    hasher.update(b":");
    hasher.update(Utc::now().timestamp().to_le_bytes());
    hasher.update(b":");
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}
