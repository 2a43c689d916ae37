//! Webhook signature verification
//!
//! The processor signs every delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` using the endpoint's signing secret and sends
//! the result in the `Stripe-Signature` header:
//!
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869...,v1=<next secret during rotation>
//! ```
//!
//! A delivery verifies when any `v1` entry matches and the timestamp is
//! within the configured tolerance of the local clock. Comparison is
//! constant-time. The body must be the exact bytes received; re-serialised
//! JSON will not verify.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{Error, Result};

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Signature scheme this verifier accepts
const SCHEME: &str = "v1";

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures against the shared signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        Error::SignatureInvalid("timestamp is not an integer".to_string())
                    })?);
                }
                // Entries that are not valid hex cannot match; skip them
                SCHEME => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| Error::SignatureInvalid("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(Error::SignatureInvalid(format!(
                "no {SCHEME} signatures found"
            )));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

impl SignatureVerifier {
    /// Create a verifier
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Create a verifier from the service configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.webhook_secret(), config.webhook_tolerance)
    }

    /// Maximum accepted clock distance of the signed timestamp
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verify `payload` against the header value using the current time
    ///
    /// Returns the signed timestamp on success.
    ///
    /// # Errors
    ///
    /// `Error::SignatureInvalid` if the header is malformed, no signature
    /// matches, or the timestamp is outside the tolerance.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<i64> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify against an explicit clock reading (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<i64> {
        let parsed = SignatureHeader::parse(header)?;

        let expected = self.compute(parsed.timestamp, payload)?;
        let matched = parsed
            .signatures
            .iter()
            .fold(false, |acc, candidate| acc | bool::from(expected.ct_eq(candidate)));
        if !matched {
            warn!("Webhook signature mismatch");
            return Err(Error::SignatureInvalid(
                "no signature matches the payload".to_string(),
            ));
        }

        let age = now.saturating_sub(parsed.timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            warn!(age_secs = age, "Webhook timestamp outside tolerance");
            return Err(Error::SignatureInvalid(format!(
                "timestamp outside tolerance ({age}s)"
            )));
        }

        Ok(parsed.timestamp)
    }

    /// Produce a header value for `payload` at `timestamp`
    ///
    /// Used to sign locally generated deliveries (tests, replay tooling).
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let signature = self.compute(timestamp, payload)?;
        Ok(format!("t={timestamp},{SCHEME}={}", hex::encode(signature)))
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("webhook secret rejected by HMAC: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
