use crate::models::{ClientInfo, DownloadLogEntry, DownloadOutcome};
use crate::store::LedgerStore;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid download link")]
    InvalidToken,

    /// Covers both expiry and an exhausted counter. The two causes are
    /// deliberately indistinguishable to the requester; the log records
    /// which one it was.
    #[error("download link has expired or exceeded limit")]
    LinkExpired,
}

/// What a successful resolve hands back for streaming by the blob store.
#[derive(Debug, Clone)]
pub struct DownloadGrant {
    pub entitlement_id: Uuid,
    pub content_ref: String,
    pub remaining: u32,
}

/// Per-request context captured at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client: ClientInfo,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(client: ClientInfo) -> Self {
        Self {
            client,
            started: Instant::now(),
        }
    }
}

impl ClientInfo {
    /// Light fingerprint from the raw User-Agent. Good enough for the audit
    /// log; this is not a security control.
    pub fn from_user_agent(ip: impl Into<String>, user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        let browser_family = if ua.contains("edg") {
            "Edge"
        } else if ua.contains("firefox") {
            "Firefox"
        } else if ua.contains("chrome") {
            "Chrome"
        } else if ua.contains("safari") {
            "Safari"
        } else {
            "Other"
        };
        let os_family = if ua.contains("android") {
            "Android"
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            "iOS"
        } else if ua.contains("windows") {
            "Windows"
        } else if ua.contains("mac os") {
            "macOS"
        } else if ua.contains("linux") {
            "Linux"
        } else {
            "Other"
        };
        let is_mobile = ua.contains("mobile")
            || ua.contains("phone")
            || os_family == "Android"
            || os_family == "iOS";
        let is_bot = ["bot", "crawler", "spider", "wget", "curl", "python-requests", "headless"]
            .iter()
            .any(|needle| ua.contains(needle));

        Self {
            ip: ip.into(),
            user_agent: user_agent.chars().take(1000).collect(),
            browser_family: browser_family.to_string(),
            os_family: os_family.to_string(),
            device_family: if is_mobile { "Mobile" } else { "Desktop" }.to_string(),
            is_mobile,
            is_bot,
        }
    }
}

/// Enforces per-entitlement download limits and expiry, and keeps the
/// append-only download log.
pub struct DownloadGatekeeper {
    store: Arc<LedgerStore>,
}

impl DownloadGatekeeper {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Validate a token and, on success, consume one download. The
    /// expiry/limit check, the decrement and the log append all happen under
    /// the ledger write guard, so two requests racing for the last remaining
    /// download cannot both succeed.
    pub async fn resolve(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<DownloadGrant, DownloadError> {
        let mut state = self.store.write().await;

        // Unknown token: nothing to log an entry against.
        let ent = state
            .entitlement_by_token(token)
            .cloned()
            .ok_or(DownloadError::InvalidToken)?;

        let now = chrono::Utc::now();
        if ent.is_expired(now) || ent.is_exhausted() {
            let reason = if ent.is_expired(now) {
                "expired"
            } else {
                "limit_exceeded"
            };
            state.append_log(DownloadLogEntry {
                id: Uuid::new_v4(),
                entitlement_id: ent.id,
                at: now,
                client: ctx.client.clone(),
                outcome: DownloadOutcome::Denied,
                reason: Some(reason.to_string()),
                duration_ms: ctx.started.elapsed().as_millis() as u64,
            });
            tracing::warn!(entitlement_id = %ent.id, reason, "download denied");
            return Err(DownloadError::LinkExpired);
        }

        let remaining = {
            let ent = state
                .entitlement_by_token_mut(token)
                .ok_or(DownloadError::InvalidToken)?;
            ent.remaining -= 1;
            ent.remaining
        };
        state.append_log(DownloadLogEntry {
            id: Uuid::new_v4(),
            entitlement_id: ent.id,
            at: now,
            client: ctx.client.clone(),
            outcome: DownloadOutcome::Success,
            reason: None,
            duration_ms: ctx.started.elapsed().as_millis() as u64,
        });
        tracing::info!(entitlement_id = %ent.id, remaining, "download granted");

        Ok(DownloadGrant {
            entitlement_id: ent.id,
            content_ref: ent.content_ref,
            remaining,
        })
    }

    /// Audit read over the append-only log.
    pub async fn log_entries(&self, entitlement_id: Uuid) -> Vec<DownloadLogEntry> {
        self.store.read().await.log_for_entitlement(&entitlement_id)
    }
}
