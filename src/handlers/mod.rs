//! HTTP surface
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /checkout` | open a checkout session |
//! | `GET /payment/status` | live session status (read-only) |
//! | `GET /payment/cancelled` | cancellation page |
//! | `POST /webhook` | processor events |
//! | `GET /finalize` | success redirect landing, 303 to viewer or cancellation |
//! | `GET /documents/:id` | released document |
//! | `PUT /documents/:id` | document upload (bearer token) |
//! | `GET /health`, `/ready`, `/status`, `/metrics` | operations |
//!
//! API routes answer JSON errors; browser routes answer HTML pages or
//! redirects.

pub mod checkout;
pub mod documents;
pub mod finalize;
pub mod pages;
pub mod payment;
pub mod status;
pub mod webhook;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::checkout::CheckoutSessionBroker;
use crate::config::AppConfig;
use crate::cors::CorsConfig;
use crate::documents::{DocumentStore, FsDocumentStore, InMemoryDocumentStore};
use crate::error::Result;
use crate::fulfillment::{FsFulfillmentStore, FulfillmentStore, InMemoryFulfillmentStore};
use crate::processor::PaymentProcessor;
use crate::release::{ReleaseCoordinator, CANCELLATION_PATH};
use crate::resolver::SessionStatusResolver;
use crate::security::{security_headers, UploadAuth};
use crate::webhook::{
    IdempotencyStore, InMemoryIdempotencyStore, SignatureVerifier, WebhookIngester,
};

pub use status::ServiceStats;

/// Backing stores for one service instance
#[derive(Clone)]
pub struct Stores {
    /// Fulfillment records
    pub fulfillment: Arc<dyn FulfillmentStore>,
    /// Document bytes
    pub documents: Arc<dyn DocumentStore>,
    /// Webhook event-id cache
    pub events: Arc<dyn IdempotencyStore>,
}

impl Stores {
    /// Process-local stores (tests, `--in-memory`)
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            fulfillment: Arc::new(InMemoryFulfillmentStore::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
            events: Arc::new(InMemoryIdempotencyStore::new(
                config.event_cache_ttl,
                config.event_cache_max,
            )),
        }
    }

    /// Filesystem stores under the configured data directory
    ///
    /// The event-id cache stays in memory; losing it only costs redundant
    /// no-op confirmations.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            fulfillment: Arc::new(FsFulfillmentStore::open(config.fulfillment_dir()).await?),
            documents: Arc::new(FsDocumentStore::open(config.documents_dir()).await?),
            events: Arc::new(InMemoryIdempotencyStore::new(
                config.event_cache_ttl,
                config.event_cache_max,
            )),
        })
    }
}

/// Shared application state
pub struct AppState {
    /// Checkout session creation
    pub broker: CheckoutSessionBroker,
    /// Status pulls
    pub resolver: SessionStatusResolver,
    /// Fulfillment state machine
    pub coordinator: ReleaseCoordinator,
    /// Webhook ingestion
    pub ingester: WebhookIngester,
    /// Document bytes
    pub documents: Arc<dyn DocumentStore>,
    /// Upload guard
    pub upload_auth: UploadAuth,
    /// Upload size limit
    pub max_document_bytes: usize,
    /// CORS policy for API routes
    pub cors: CorsConfig,
    /// Request statistics
    pub stats: ServiceStats,
}

impl AppState {
    /// Wire all components from configuration
    pub fn new(config: &AppConfig, processor: Arc<dyn PaymentProcessor>, stores: Stores) -> Self {
        let resolver = SessionStatusResolver::new(processor.clone());
        let coordinator = ReleaseCoordinator::new(stores.fulfillment, resolver.clone())
            .with_secure_cookies(config.secure_cookies());
        let ingester = WebhookIngester::new(
            SignatureVerifier::from_config(config),
            stores.events,
            coordinator.clone(),
        );

        Self {
            broker: CheckoutSessionBroker::from_config(processor, config),
            resolver,
            coordinator,
            ingester,
            documents: stores.documents,
            upload_auth: UploadAuth::new(config.upload_token()),
            max_document_bytes: config.max_document_bytes,
            cors: CorsConfig::from_app_config(config),
            stats: ServiceStats::new(),
        }
    }
}

/// Build the full router
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/checkout", post(checkout::create_checkout_handler))
        .route("/payment/status", get(payment::payment_status_handler))
        .layer(state.cors.clone().layer());

    let documents = Router::new().route(
        "/documents/:id",
        get(documents::get_document_handler)
            .put(documents::put_document_handler)
            .layer(DefaultBodyLimit::max(state.max_document_bytes)),
    );

    Router::new()
        .merge(api)
        .merge(documents)
        .route(CANCELLATION_PATH, get(payment::payment_cancelled_handler))
        .route("/webhook", post(webhook::webhook_handler))
        .route("/finalize", get(finalize::finalize_handler))
        .route("/health", get(status::health_handler))
        .route("/ready", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .route("/metrics", get(status::metrics_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            status::track_requests,
        ))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
