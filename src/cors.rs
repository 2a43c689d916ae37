//! CORS policy for the JSON API
//!
//! The checkout form may be served from a different origin than this
//! service, so `POST /checkout` and `GET /payment/status` need CORS. Only the
//! configured origins are allowed; there is no wildcard mode.
//!
//! - **Allowed Origins**: exact `scheme://host[:port]` matches from
//!   `DOCGATE_ALLOWED_ORIGINS` (default: the public URL's origin)
//! - **Allowed Methods**: GET, POST, OPTIONS
//! - **Allowed Headers**: Content-Type
//! - **Max Age**: 3600 seconds

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use http::{header::HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;
use url::Url;

use crate::config::AppConfig;

/// Allowed request headers
pub const ALLOWED_HEADERS: [http::header::HeaderName; 1] = [http::header::CONTENT_TYPE];

/// Allowed methods
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Normalised origins allowed to call the API
    pub allowed_origins: HashSet<String>,
    /// Maximum age for preflight cache in seconds
    pub max_age_secs: u64,
}

impl CorsConfig {
    /// Build from a list of origins; entries that are not valid origins are
    /// logged and skipped
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_origins = origins
            .into_iter()
            .filter_map(|raw| {
                let normalised = normalise_origin(raw.as_ref());
                if normalised.is_none() {
                    warn!(origin = raw.as_ref(), "Ignoring invalid CORS origin");
                }
                normalised
            })
            .collect();

        Self {
            allowed_origins,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }

    /// Build from the service configuration
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(&config.allowed_origins)
    }

    /// Set the maximum age for preflight cache
    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Whether a request `Origin` header value is allowed
    pub fn is_allowed(&self, origin: &HeaderValue) -> bool {
        origin
            .to_str()
            .ok()
            .and_then(normalise_origin)
            .is_some_and(|o| self.allowed_origins.contains(&o))
    }

    /// Build the tower-http layer
    pub fn layer(self) -> CorsLayer {
        let max_age = Duration::from_secs(self.max_age_secs);
        let config = Arc::new(self);
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin, _| {
                config.is_allowed(origin)
            }))
            .allow_methods(ALLOWED_METHODS)
            .allow_headers(ALLOWED_HEADERS)
            .max_age(max_age)
    }
}

/// Reduce an origin or URL to its `scheme://host[:port]` serialisation
///
/// Returns `None` for anything that is not an http(s) origin.
pub fn normalise_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.origin().ascii_serialization())
}
