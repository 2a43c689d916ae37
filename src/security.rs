//! Response hardening and upload authentication
//!
//! - [`security_headers`]: middleware adding the standard hardening headers to
//!   every response that does not already set them
//! - [`UploadAuth`]: bearer-token check for `PUT /documents/{id}`
//!
//! Handlers that need a different policy (the document viewer relaxes CSP for
//! inline styles and allows short private caching) set the header themselves;
//! the middleware never overwrites.

use axum::extract::Request;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{Error, Result};

/// Cache policy for released documents
pub const DOCUMENT_CACHE_CONTROL: &str = "private, max-age=300";

/// CSP for released documents: inline styles and data-URI images only
pub const DOCUMENT_CSP: &str =
    "default-src 'none'; style-src 'unsafe-inline'; img-src data:; frame-ancestors 'none'";

/// Security headers applied to all responses
#[derive(Debug, Clone)]
pub struct SecurityHeaders;

impl SecurityHeaders {
    /// Standard security headers
    pub fn headers() -> [(HeaderName, &'static str); 6] {
        [
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::X_FRAME_OPTIONS, "DENY"),
            (
                header::CONTENT_SECURITY_POLICY,
                "default-src 'none'; style-src 'unsafe-inline'; frame-ancestors 'none'",
            ),
            (header::REFERRER_POLICY, "no-referrer"),
            (header::CACHE_CONTROL, "no-store"),
            (
                HeaderName::from_static("permissions-policy"),
                "geolocation=(), microphone=(), camera=(), payment=()",
            ),
        ]
    }
}

/// Add [`SecurityHeaders`] to the response, keeping any the handler set
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SecurityHeaders::headers() {
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
    response
}

/// Bearer-token guard for document uploads
///
/// Only the SHA-256 of the token is kept; comparison is constant-time.
#[derive(Clone)]
pub struct UploadAuth {
    token_hash: Option<[u8; 32]>,
}

impl std::fmt::Debug for UploadAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl UploadAuth {
    /// Guard accepting `token`; `None` disables uploads entirely
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token_hash: token.map(hash_token),
        }
    }

    /// Whether uploads are accepted at all
    pub fn is_enabled(&self) -> bool {
        self.token_hash.is_some()
    }

    /// Check an `Authorization` header value
    ///
    /// # Errors
    ///
    /// `Error::Unauthorized` when uploads are disabled, the header is missing
    /// or not `Bearer <token>`, or the token does not match.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<()> {
        let Some(expected) = &self.token_hash else {
            return Err(Error::Unauthorized("document uploads are disabled".to_string()));
        };

        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Unauthorized("expected Authorization: Bearer <token>".to_string())
            })?;

        if bool::from(hash_token(token)[..].ct_eq(&expected[..])) {
            Ok(())
        } else {
            warn!("Invalid upload token");
            Err(Error::Unauthorized("invalid token".to_string()))
        }
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}
