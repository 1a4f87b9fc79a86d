//! Stripe checkout and webhook handling
//!
//! The API surface is deliberately small: create one checkout session
//! per purchase, and credit the account when the signed
//! `checkout.session.completed` webhook arrives. Raw form-encoded
//! calls against the Stripe REST API, no SDK.

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::auth::constant_time_eq;
use crate::config::CreditPackage;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Reject webhook timestamps older than this, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Stripe request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Stripe API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Malformed webhook signature header")]
    MalformedSignature,
    #[error("Webhook signature verification failed")]
    BadSignature,
    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Create a hosted checkout session for one credit package. The
    /// user id and credit count ride along as metadata and come back
    /// in the completion webhook.
    pub async fn create_checkout_session(
        &self,
        package: &CreditPackage,
        user_id: i64,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let unit_amount = (package.price * 100).to_string();
        let credits = package.credits.to_string();
        let user_id = user_id.to_string();
        let product_name = format!("{} credits", package.credits);

        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", "brl"),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][price_data][product_data][name]", &product_name),
            ("metadata[user_id]", &user_id),
            ("metadata[credits]", &credits),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "checkout session creation failed");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// A completed purchase extracted from a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub user_id: i64,
    pub credits: i64,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// The header is `t=<unix>,v1=<hex hmac>,...`; the signed message is
/// `"{t}.{body}"`. Comparison is constant time and the timestamp must
/// be within `tolerance_secs` of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for item in header.split(',') {
        match item.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| PaymentError::MalformedSignature)?);
            }
            Some(("v1", value)) => {
                signatures.push(decode_hex(value).ok_or(PaymentError::MalformedSignature)?);
            }
            _ => {} // other schemes (v0) are ignored
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(PaymentError::MalformedSignature);
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(PaymentError::StaleTimestamp);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if signatures.iter().any(|sig| constant_time_eq(sig, &expected)) {
        Ok(())
    } else {
        Err(PaymentError::BadSignature)
    }
}

/// Parse a raw webhook body into an event.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Extract the purchase from a `checkout.session.completed` event.
/// Returns `None` for every other event type, and for completed
/// sessions whose metadata is missing or unparseable.
pub fn completed_checkout(event: &WebhookEvent) -> Option<CompletedCheckout> {
    if event.event_type != "checkout.session.completed" {
        return None;
    }

    let metadata = event.data.object.get("metadata")?;
    let user_id = metadata.get("user_id")?.as_str()?.parse().ok()?;
    let credits = metadata.get("credits")?.as_str()?.parse().ok()?;

    Some(CompletedCheckout { user_id, credits })
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (*pair.first()? as char).to_digit(16)?;
            let lo = (*pair.get(1)? as char).to_digit(16)?;
            u8::try_from(hi * 16 + lo).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!(
            "t={timestamp},v1={}",
            encode_hex(&mac.finalize().into_bytes())
        )
    }

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(body, SECRET, NOW);
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let header = sign(body, "whsec_other", NOW);
        assert!(matches!(
            verify_webhook_signature(body, &header, SECRET, 300, NOW).unwrap_err(),
            PaymentError::BadSignature
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(b"original", SECRET, NOW);
        assert!(matches!(
            verify_webhook_signature(b"tampered", &header, SECRET, 300, NOW).unwrap_err(),
            PaymentError::BadSignature
        ));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"payload";
        let header = sign(body, SECRET, NOW - 301);
        assert!(matches!(
            verify_webhook_signature(body, &header, SECRET, 300, NOW).unwrap_err(),
            PaymentError::StaleTimestamp
        ));
    }

    #[test]
    fn test_malformed_headers_rejected() {
        for header in ["", "t=abc,v1=00", "v1=00", "t=123", "t=123,v1=zz"] {
            assert!(matches!(
                verify_webhook_signature(b"x", header, SECRET, 300, NOW).unwrap_err(),
                PaymentError::MalformedSignature
            ));
        }
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let body = b"payload";
        let good = sign(body, SECRET, NOW);
        let (t_part, sig_part) = good.split_once(',').unwrap();
        let header = format!("{t_part},v1={},{sig_part}", "0".repeat(64));
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_completed_checkout_extraction() {
        let body = json!({
            "type": "checkout.session.completed",
            "data": {"object": {"metadata": {"user_id": "7", "credits": "550"}}}
        });
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            completed_checkout(&event),
            Some(CompletedCheckout {
                user_id: 7,
                credits: 550
            })
        );
    }

    #[test]
    fn test_other_events_are_ignored() {
        let body = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {}}
        });
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(completed_checkout(&event), None);
    }

    #[test]
    fn test_completed_event_with_bad_metadata_is_ignored() {
        let body = json!({
            "type": "checkout.session.completed",
            "data": {"object": {"metadata": {"user_id": "not a number", "credits": "10"}}}
        });
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(completed_checkout(&event), None);
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes = [0u8, 1, 15, 16, 255];
        assert_eq!(decode_hex(&encode_hex(&bytes)).unwrap(), bytes);
        assert!(decode_hex("abc").is_none());
        assert!(decode_hex("zz").is_none());
    }
}
