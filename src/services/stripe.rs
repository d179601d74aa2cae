use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Webhooks signed longer ago than this are refused as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("checkout session has no redirect url")]
    MissingUrl,
    #[error("invalid webhook signature: {0}")]
    Signature(String),
    #[error("invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub label: String,
    pub amount_minor: i64,
    pub currency: String,
    pub service_type: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Paid,
    Expired,
}

/// Hosted checkout provider.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn session_state(&self, session_id: String) -> Result<SessionState, GatewayError>;
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Our order id, from `client_reference_id` or `metadata.order_id`.
    pub fn order_reference(&self) -> Option<String> {
        let object = &self.data.object;
        object
            .get("client_reference_id")
            .and_then(|v| v.as_str())
            .or_else(|| {
                object
                    .get("metadata")
                    .and_then(|m| m.get("order_id"))
                    .and_then(|v| v.as_str())
            })
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResp {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
}

fn session_state_of(status: Option<&str>, payment_status: Option<&str>) -> SessionState {
    match (status, payment_status) {
        (_, Some("paid")) | (_, Some("no_payment_required")) => SessionState::Paid,
        (Some("expired"), _) => SessionState::Expired,
        _ => SessionState::Open,
    }
}

pub struct StripeService {
    http: Client,
    secret_key: Option<String>,
}

impl StripeService {
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            secret_key,
        }
    }

    pub fn from_config() -> Self {
        Self::new(Config::stripe_secret_key())
    }

    fn secret_key(&self) -> Result<&str, GatewayError> {
        self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or(body);

        error!(
            "stripe: {} failed with {} (request_id={}): {}",
            context, status, request_id, message
        );
        Err(GatewayError::Api { status, message })
    }
}

#[async_trait]
impl PaymentGateway for StripeService {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let secret_key = self.secret_key()?;

        let mut body: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("client_reference_id".into(), request.order_id.clone()),
            ("success_url".into(), request.success_url),
            ("cancel_url".into(), request.cancel_url),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), request.currency),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_minor.to_string(),
            ),
            ("line_items[0][price_data][product_data][name]".into(), request.label),
            ("metadata[order_id]".into(), request.order_id),
            ("metadata[service_type]".into(), request.service_type),
        ];
        if let Some(email) = request.customer_email {
            body.push(("customer_email".into(), email));
        }

        let resp = self
            .http
            .post(format!("{}/checkout/sessions", STRIPE_API))
            .header(AUTHORIZATION, format!("Bearer {}", secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        let parsed: SessionResp = resp.json().await?;
        let url = parsed.url.ok_or(GatewayError::MissingUrl)?;
        Ok(CheckoutSession { id: parsed.id, url })
    }

    async fn session_state(&self, session_id: String) -> Result<SessionState, GatewayError> {
        let secret_key = self.secret_key()?;

        let resp = self
            .http
            .get(format!("{}/checkout/sessions/{}", STRIPE_API, session_id))
            .header(AUTHORIZATION, format!("Bearer {}", secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve checkout session").await?;

        let parsed: SessionResp = resp.json().await?;
        Ok(session_state_of(
            parsed.status.as_deref(),
            parsed.payment_status.as_deref(),
        ))
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>`) against the raw payload.
/// https://stripe.com/docs/webhooks/signatures
pub fn verify_webhook(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_secs: i64,
) -> Result<StripeEvent, GatewayError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp = timestamp.ok_or_else(|| GatewayError::Signature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(GatewayError::Signature("missing v1 signature".into()));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| GatewayError::Signature("malformed timestamp".into()))?;
    if (now_secs - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(GatewayError::Signature("timestamp outside tolerance".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Signature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|provided| mac.clone().verify_slice(&provided).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(GatewayError::Signature("signature mismatch".into()));
    }

    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1","client_reference_id":"SLX-ABC"}}}"#;

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_correctly_signed_event() {
        let header = sign(PAYLOAD, 1_700_000_000, SECRET);
        let event = verify_webhook(PAYLOAD.as_bytes(), &header, SECRET, 1_700_000_100).unwrap();

        assert_eq!(event.type_, "checkout.session.completed");
        assert_eq!(event.order_reference().as_deref(), Some("SLX-ABC"));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_payload() {
        let header = sign(PAYLOAD, 1_700_000_000, "whsec_other");
        assert!(matches!(
            verify_webhook(PAYLOAD.as_bytes(), &header, SECRET, 1_700_000_000),
            Err(GatewayError::Signature(_))
        ));

        let header = sign(PAYLOAD, 1_700_000_000, SECRET);
        let tampered = PAYLOAD.replace("SLX-ABC", "SLX-XYZ");
        assert!(verify_webhook(tampered.as_bytes(), &header, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_stale_signatures() {
        let header = sign(PAYLOAD, 1_700_000_000, SECRET);
        assert!(verify_webhook(PAYLOAD.as_bytes(), &header, SECRET, 1_700_000_301).is_err());
    }

    #[test]
    fn rejects_headers_without_v1() {
        assert!(verify_webhook(PAYLOAD.as_bytes(), "t=1700000000", SECRET, 1_700_000_000).is_err());
        assert!(verify_webhook(PAYLOAD.as_bytes(), "garbage", SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn order_reference_falls_back_to_metadata() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"type":"checkout.session.expired","data":{"object":{"metadata":{"order_id":"SLX-META"}}}}"#,
        )
        .unwrap();
        assert_eq!(event.order_reference().as_deref(), Some("SLX-META"));
    }

    #[test]
    fn maps_session_states() {
        assert_eq!(session_state_of(Some("complete"), Some("paid")), SessionState::Paid);
        assert_eq!(session_state_of(Some("open"), Some("unpaid")), SessionState::Open);
        assert_eq!(session_state_of(Some("expired"), Some("unpaid")), SessionState::Expired);
    }
}
