//! Service configuration
//!
//! All settings are read from environment variables. Secrets (the processor
//! API key and the webhook signing secret) have no defaults and are never
//! logged.
//!
//! - `STRIPE_SECRET_KEY` (required): processor API key
//! - `STRIPE_WEBHOOK_SECRET` (required): webhook signing secret
//! - `STRIPE_API_BASE`: processor API base URL (default: `https://api.stripe.com`)
//! - `DOCGATE_PUBLIC_URL`: externally visible base URL (default: `http://localhost:3000`)
//! - `DOCGATE_DATA_DIR`: root for the filesystem stores (default: `./data`)
//! - `DOCGATE_PRICE_CENTS`, `DOCGATE_CURRENCY`, `DOCGATE_PRODUCT_NAME`: line item
//! - `DOCGATE_WEBHOOK_TOLERANCE_SECS`: signature timestamp tolerance (default: 300)
//! - `DOCGATE_PROCESSOR_TIMEOUT_SECS`: per-call processor timeout (default: 10)
//! - `DOCGATE_MAX_DOCUMENT_BYTES`: upload limit (default: 5 MiB)
//! - `DOCGATE_EVENT_CACHE_TTL_SECS`, `DOCGATE_EVENT_CACHE_MAX`: webhook event-id cache
//! - `DOCGATE_ALLOWED_ORIGINS`: comma-separated CORS origins (default: public URL origin)
//! - `DOCGATE_UPLOAD_TOKEN`: bearer token for `PUT /documents/{id}` (uploads disabled if unset)

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Default processor API base URL
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Default signature timestamp tolerance (5 minutes)
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Default upload size limit (5 MiB)
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Runtime configuration for the whole service
#[derive(Clone)]
pub struct AppConfig {
    /// Processor API key (from STRIPE_SECRET_KEY)
    secret_key: String,

    /// Webhook signing secret (from STRIPE_WEBHOOK_SECRET)
    webhook_secret: String,

    /// Bearer token for document uploads (from DOCGATE_UPLOAD_TOKEN)
    upload_token: Option<String>,

    /// Processor API base URL
    pub api_base: Url,

    /// Externally visible base URL used for success/cancel redirects
    pub public_url: Url,

    /// Root directory for filesystem-backed stores
    pub data_dir: PathBuf,

    /// Line item price in the smallest currency unit
    pub price_cents: u64,

    /// ISO currency code
    pub currency: String,

    /// Product name shown on the hosted payment page
    pub product_name: String,

    /// Maximum age of a webhook signature timestamp
    pub webhook_tolerance: Duration,

    /// Timeout for each processor call
    pub processor_timeout: Duration,

    /// Upload size limit for documents
    pub max_document_bytes: usize,

    /// How long a processed webhook event id is remembered
    pub event_cache_ttl: Duration,

    /// Maximum number of remembered webhook event ids
    pub event_cache_max: usize,

    /// Origins allowed to call the JSON API cross-origin
    pub allowed_origins: Vec<String>,
}

// Manual Debug so secrets never reach a log line
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("upload_token", &self.upload_token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base.as_str())
            .field("public_url", &self.public_url.as_str())
            .field("data_dir", &self.data_dir)
            .field("price_cents", &self.price_cents)
            .field("currency", &self.currency)
            .field("product_name", &self.product_name)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("processor_timeout", &self.processor_timeout)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("event_cache_ttl", &self.event_cache_ttl)
            .field("event_cache_max", &self.event_cache_max)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

impl AppConfig {
    /// Load the configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required secret is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        let secret_key = required("STRIPE_SECRET_KEY")?;
        let webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;

        if !webhook_secret.starts_with("whsec_") {
            warn!("STRIPE_WEBHOOK_SECRET does not look like a signing secret (expected whsec_ prefix)");
        }

        let api_base = parse_url("STRIPE_API_BASE", DEFAULT_API_BASE)?;
        let public_url = parse_url("DOCGATE_PUBLIC_URL", "http://localhost:3000")?;

        let allowed_origins = match env::var("DOCGATE_ALLOWED_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => vec![public_url.origin().ascii_serialization()],
        };

        let upload_token = env::var("DOCGATE_UPLOAD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        if upload_token.is_none() {
            info!("DOCGATE_UPLOAD_TOKEN not set, document uploads are disabled");
        }

        let config = Self {
            secret_key,
            webhook_secret,
            upload_token,
            api_base,
            public_url,
            data_dir: PathBuf::from(
                env::var("DOCGATE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
            price_cents: parse_or("DOCGATE_PRICE_CENTS", 999)?,
            currency: env::var("DOCGATE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            product_name: env::var("DOCGATE_PRODUCT_NAME")
                .unwrap_or_else(|_| "Document".to_string()),
            webhook_tolerance: Duration::from_secs(parse_or(
                "DOCGATE_WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )?),
            processor_timeout: Duration::from_secs(parse_or("DOCGATE_PROCESSOR_TIMEOUT_SECS", 10)?),
            max_document_bytes: parse_or("DOCGATE_MAX_DOCUMENT_BYTES", DEFAULT_MAX_DOCUMENT_BYTES)?,
            event_cache_ttl: Duration::from_secs(parse_or("DOCGATE_EVENT_CACHE_TTL_SECS", 86_400)?),
            event_cache_max: parse_or("DOCGATE_EVENT_CACHE_MAX", 10_000)?,
            allowed_origins,
        };

        if config.price_cents == 0 {
            return Err(Error::Config("DOCGATE_PRICE_CENTS cannot be 0".to_string()));
        }

        info!(
            api_base = %config.api_base,
            public_url = %config.public_url,
            data_dir = %config.data_dir.display(),
            tolerance_secs = config.webhook_tolerance.as_secs(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Deterministic configuration for tests
    pub fn test_config() -> Self {
        Self {
            secret_key: "sk_test_docgate".to_string(),
            webhook_secret: "whsec_test_docgate_secret".to_string(),
            upload_token: Some("upload_test_token".to_string()),
            api_base: Url::parse("http://127.0.0.1:9").expect("static url"),
            public_url: Url::parse("http://localhost:3000").expect("static url"),
            data_dir: PathBuf::from("./data"),
            price_cents: 999,
            currency: "usd".to_string(),
            product_name: "Document".to_string(),
            webhook_tolerance: Duration::from_secs(DEFAULT_WEBHOOK_TOLERANCE_SECS),
            processor_timeout: Duration::from_secs(2),
            max_document_bytes: 64 * 1024,
            event_cache_ttl: Duration::from_secs(3600),
            event_cache_max: 1000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }

    /// Processor API key
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Webhook signing secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Bearer token required for document uploads, if uploads are enabled
    pub fn upload_token(&self) -> Option<&str> {
        self.upload_token.as_deref()
    }

    /// Whether cookies should carry `Secure` (public URL is https)
    pub fn secure_cookies(&self) -> bool {
        self.public_url.scheme() == "https"
    }

    /// Override the processor API base (used to point at a fake processor)
    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    /// Override the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Directory holding fulfillment records
    pub fn fulfillment_dir(&self) -> PathBuf {
        self.data_dir.join("fulfillments")
    }

    /// Directory holding stored documents
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{name} environment variable not set"))),
    }
}

fn parse_url(name: &str, default: &str) -> Result<Url> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| Error::Config(format!("{name}: {e}")))
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        Err(_) => Ok(default),
    }
}
