//! Webhook signature verification.
//!
//! Authenticates raw webhook payloads against the provider's shared secret
//! before any parsing or state change happens. Verification is pure: it
//! touches no store and has no side effects.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::BillingError;
use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance for the signed timestamp (replay protection).
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies webhook payloads against the provider's signing secret.
///
/// The provider signs `"{timestamp}.{raw_body}"` with HMAC-SHA256 and sends
/// the result in a `Stripe-Signature` style header (`t=<unix>,v1=<hex>`).
/// The secret is held as a [`SecretString`] so it never shows up in debug
/// output or logs.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// Create a verifier with the default 5 minute timestamp tolerance.
    #[must_use]
    pub fn new(secret: impl Into<SecretString>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the timestamp tolerance window.
    #[must_use]
    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify the signature over the exact raw body bytes and parse the event.
    ///
    /// Fails closed: a malformed header, a timestamp outside the tolerance
    /// window, a signature mismatch, or an unparseable payload all reject the
    /// delivery. The caller must make no state change on error.
    ///
    /// # Errors
    /// Returns a `BadRequest`-mapped error on any verification failure.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        let sig_parts = parse_signature_header(signature_header)?;

        let now = unix_now() as i64;
        let age = (now - sig_parts.timestamp).abs();
        if age > self.tolerance_secs {
            return Err(BillingError::TimestampExpired { age_seconds: age }.into());
        }

        // The signature covers "{timestamp}.{raw_body}" as raw bytes
        let mut signed_payload = sig_parts.timestamp.to_string().into_bytes();
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let expected = compute_signature(self.secret.expose_secret(), &signed_payload);
        let provided = hex::decode(&sig_parts.signature).map_err(|_| {
            BillingError::InvalidSignatureHeader {
                message: "v1 signature is not valid hex".to_string(),
            }
        })?;

        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(BillingError::InvalidSignature.into());
        }

        // Only parse after the payload is authenticated. Log the parse error
        // internally but return a generic message.
        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(
                target: "billsync::billing",
                error = %e,
                "failed to parse verified webhook payload"
            );
            BillingError::InvalidPayload {
                message: "malformed JSON payload".to_string(),
            }
        })?;

        Ok(event)
    }
}

/// A verified, parsed webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Provider-assigned event ID (stable across redeliveries).
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Timestamp when the provider created the event.
    pub created: u64,
}

/// Webhook event data.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The object that triggered the event.
    pub object: serde_json::Value,
}

/// Parsed signature header parts.
struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parse the `t=<unix>,v1=<hex>` signature header.
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(BillingError::InvalidSignatureHeader {
                message: "expected comma-separated key=value pairs".to_string(),
            }
            .into());
        };

        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // Ignore other scheme versions
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp.ok_or_else(|| BillingError::InvalidSignatureHeader {
            message: "missing timestamp".to_string(),
        })?,
        signature: signature.ok_or_else(|| BillingError::InvalidSignatureHeader {
            message: "missing v1 signature".to_string(),
        })?,
    })
}

/// Compute the HMAC-SHA256 signature bytes.
fn compute_signature(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
