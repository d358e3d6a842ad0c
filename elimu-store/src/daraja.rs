//! Daraja (M-Pesa) STK-push client and callback normalization.
//!
//! Everything provider-shaped lives here: the loosely-typed JSON the
//! provider speaks is converted to `PaymentOutcome` at this boundary and
//! nothing past it ever sees a ResultCode.

use crate::app_config::MpesaConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use elimu_core::payment::{
    ChargeHandle, ChargeRequest, OutcomeKind, PaymentOutcome, PaymentProvider, ProviderError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Daraja result codes observed in callbacks and status queries.
const RESULT_SUCCESS: i64 = 0;
const RESULT_CANCELLED_BY_USER: i64 = 1032;
const RESULT_PUSH_TIMEOUT: i64 = 1037;
// errorCode on stkpushquery while the push is still on the handset.
const ERROR_STILL_PROCESSING: &str = "500.001.1001";

pub struct DarajaClient {
    http: reqwest::Client,
    cfg: MpesaConfig,
}

impl DarajaClient {
    pub fn new(cfg: MpesaConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.cfg.base_url
        );
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.cfg.consumer_key, Some(&self.cfg.consumer_secret))
            .send()
            .await
            .map_err(net_err)?;
        if !resp.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "token request failed with status {}",
                resp.status()
            )));
        }
        let auth: AuthResponse = resp.json().await.map_err(net_err)?;
        Ok(auth.access_token)
    }

    /// Password is base64(shortcode + passkey + timestamp).
    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.cfg.shortcode, self.cfg.passkey, timestamp
        ))
    }
}

#[async_trait]
impl PaymentProvider for DarajaClient {
    async fn initiate_charge(&self, req: &ChargeRequest) -> Result<ChargeHandle, ProviderError> {
        let msisdn = normalize_msisdn(&req.msisdn)?;
        let token = self.access_token().await?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

        let payload = StkPushRequest {
            business_short_code: self.cfg.shortcode.clone(),
            password: self.password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: amount_kes(req.amount_cents),
            party_a: msisdn.clone(),
            party_b: self.cfg.shortcode.clone(),
            phone_number: msisdn,
            call_back_url: self.cfg.callback_url.clone(),
            account_reference: req.account_reference.clone(),
            transaction_desc: req.description.clone(),
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.cfg.base_url);
        let resp: StkPushResponse = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(net_err)?
            .json()
            .await
            .map_err(net_err)?;

        match (resp.response_code.as_deref(), resp.checkout_request_id) {
            (Some("0"), Some(correlation_id)) => {
                tracing::info!(%correlation_id, "stk push accepted");
                Ok(ChargeHandle {
                    correlation_id,
                    merchant_request_id: resp.merchant_request_id,
                    customer_message: resp.customer_message,
                })
            }
            _ => Err(ProviderError::Rejected(
                resp.error_message
                    .unwrap_or_else(|| "stk push rejected".to_string()),
            )),
        }
    }

    async fn query_status(&self, correlation_id: &str) -> Result<PaymentOutcome, ProviderError> {
        let token = self.access_token().await?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

        let payload = StkQueryRequest {
            business_short_code: self.cfg.shortcode.clone(),
            password: self.password(&timestamp),
            timestamp,
            checkout_request_id: correlation_id.to_string(),
        };

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.cfg.base_url);
        let resp: StkQueryResponse = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(net_err)?
            .json()
            .await
            .map_err(net_err)?;

        if resp.error_code.as_deref() == Some(ERROR_STILL_PROCESSING) {
            return Ok(PaymentOutcome {
                correlation_id: correlation_id.to_string(),
                kind: OutcomeKind::Indeterminate,
                provider_receipt: None,
                amount_cents: None,
                description: resp.error_message,
            });
        }

        let code: i64 = resp
            .result_code
            .as_deref()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| {
                ProviderError::Rejected(
                    resp.error_message
                        .unwrap_or_else(|| "status query rejected".to_string()),
                )
            })?;

        Ok(outcome_for_code(
            correlation_id,
            code,
            resp.result_desc,
            None,
            None,
        ))
    }
}

fn net_err(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Daraja takes whole shillings. Sub-shilling totals round up so the
/// customer is never charged less than the order total.
fn amount_kes(amount_cents: i64) -> i64 {
    (amount_cents + 99) / 100
}

/// Normalize a subscriber number to the 254XXXXXXXXX wire format.
pub fn normalize_msisdn(raw: &str) -> Result<String, ProviderError> {
    let mut digits = raw.trim().to_string();
    if let Some(stripped) = digits.strip_prefix('+') {
        digits = stripped.to_string();
    }
    if let Some(stripped) = digits.strip_prefix('0') {
        digits = format!("254{}", stripped);
    } else if !digits.starts_with("254") {
        digits = format!("254{}", digits);
    }
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ProviderError::InvalidPhone(raw.to_string()));
    }
    Ok(digits)
}

/// Map a Daraja result code to a normalized outcome.
fn outcome_for_code(
    correlation_id: &str,
    code: i64,
    desc: Option<String>,
    receipt: Option<String>,
    amount_cents: Option<i64>,
) -> PaymentOutcome {
    let kind = match code {
        RESULT_SUCCESS => OutcomeKind::Completed,
        RESULT_CANCELLED_BY_USER | RESULT_PUSH_TIMEOUT => OutcomeKind::Cancelled,
        _ => OutcomeKind::Failed,
    };
    PaymentOutcome {
        correlation_id: correlation_id.to_string(),
        kind,
        provider_receipt: receipt,
        amount_cents,
        description: desc,
    }
}

/// Pure translation of the asynchronous callback body. Returns `None` when
/// the payload has no CheckoutRequestID to correlate on.
pub fn normalize_callback(envelope: &CallbackEnvelope) -> Option<PaymentOutcome> {
    let cb = &envelope.body.stk_callback;
    let correlation_id = cb.checkout_request_id.as_deref()?;

    let mut receipt = None;
    let mut amount_cents = None;
    if let Some(metadata) = &cb.callback_metadata {
        for item in &metadata.item {
            match (item.name.as_str(), &item.value) {
                ("MpesaReceiptNumber", Some(v)) => {
                    receipt = v.as_str().map(|s| s.to_string());
                }
                ("Amount", Some(v)) => {
                    amount_cents = v.as_f64().map(|kes| (kes * 100.0).round() as i64);
                }
                _ => {}
            }
        }
    }

    Some(outcome_for_code(
        correlation_id,
        cb.result_code,
        cb.result_desc.clone(),
        receipt,
        amount_cents,
    ))
}

// ---- wire types ----

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    call_back_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_round_up_to_whole_shillings() {
        assert_eq!(amount_kes(1500), 15);
        assert_eq!(amount_kes(1550), 16);
        assert_eq!(amount_kes(1501), 16);
        assert_eq!(amount_kes(99), 1);
        assert_eq!(amount_kes(0), 0);
    }

    #[test]
    fn msisdn_normalization() {
        assert_eq!(normalize_msisdn("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("712345678").unwrap(), "254712345678");
        assert!(normalize_msisdn("12345").is_err());
        assert!(normalize_msisdn("07123456XY").is_err());
    }

    #[test]
    fn success_callback_normalizes_to_completed() {
        let payload = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1500.0 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "TransactionDate", "Value": 20191219102115u64 },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        });
        let envelope: CallbackEnvelope = serde_json::from_value(payload).unwrap();
        let outcome = normalize_callback(&envelope).unwrap();

        assert_eq!(outcome.correlation_id, "ws_CO_191220191020363925");
        assert_eq!(outcome.kind, OutcomeKind::Completed);
        assert_eq!(outcome.provider_receipt.as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(outcome.amount_cents, Some(150_000));
    }

    #[test]
    fn user_cancel_and_timeout_normalize_to_cancelled() {
        for code in [1032, 1037] {
            let payload = serde_json::json!({
                "Body": {
                    "stkCallback": {
                        "MerchantRequestID": "29115-34620561-1",
                        "CheckoutRequestID": "ws_CO_cancelled",
                        "ResultCode": code,
                        "ResultDesc": "Request cancelled by user"
                    }
                }
            });
            let envelope: CallbackEnvelope = serde_json::from_value(payload).unwrap();
            let outcome = normalize_callback(&envelope).unwrap();
            assert_eq!(outcome.kind, OutcomeKind::Cancelled);
        }
    }

    #[test]
    fn other_result_codes_normalize_to_failed() {
        let payload = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "CheckoutRequestID": "ws_CO_failed",
                    "ResultCode": 1,
                    "ResultDesc": "The balance is insufficient for the transaction"
                }
            }
        });
        let envelope: CallbackEnvelope = serde_json::from_value(payload).unwrap();
        let outcome = normalize_callback(&envelope).unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(
            outcome.description.as_deref(),
            Some("The balance is insufficient for the transaction")
        );
    }

    #[test]
    fn callback_without_correlation_id_is_dropped() {
        let payload = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "ResultCode": 0,
                    "ResultDesc": "ok"
                }
            }
        });
        let envelope: CallbackEnvelope = serde_json::from_value(payload).unwrap();
        assert!(normalize_callback(&envelope).is_none());
    }
}
