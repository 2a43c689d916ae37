//! Docgate - Payment-Gated Document Release
//!
//! An HTTP service that sells access to stored documents through a hosted
//! checkout. Two independent signals can report a payment: the processor's
//! signed webhook and the status pull made when the buyer's browser returns.
//! Both are reconciled by one idempotent state machine per checkout session,
//! and a document is served only after its session is released.
//!
//! # Architecture
//!
//! ```text
//! Browser ──▶ POST /checkout ──▶ CheckoutSessionBroker ──▶ Processor
//!                                                            │
//!            ┌───────────── signed webhook ◀─────────────────┤
//!            ▼                                               │
//!     WebhookIngester ──▶ ReleaseCoordinator ◀── pull ── SessionStatusResolver
//!                               │     ▲                      ▲
//!                               ▼     │                      │
//!                        FulfillmentStore     Browser ──▶ GET /finalize
//!                        pending → confirmed → released        │
//!                                                              ▼
//!                                         303 /documents/{id} + reset cookie
//!                                         303 /payment/cancelled
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docgate::config::AppConfig;
//! use docgate::handlers::{router, AppState, Stores};
//! use docgate::processor::StripeClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let processor = Arc::new(StripeClient::new(
//!         config.api_base.clone(),
//!         config.secret_key(),
//!         config.processor_timeout,
//!     )?);
//!     let stores = Stores::open(&config).await?;
//!     let app = router(Arc::new(AppState::new(&config, processor, stores)));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod checkout;
pub mod config;
pub mod cors;
pub mod documents;
pub mod error;
pub mod fulfillment;
pub mod handlers;
pub mod metrics;
pub mod processor;
pub mod release;
pub mod reset;
pub mod resolver;
pub mod security;
pub mod webhook;

// Re-exports for convenience
pub use checkout::{CheckoutRequest, CheckoutSessionBroker};
pub use config::AppConfig;
pub use documents::{Document, DocumentKey, DocumentStore};
pub use error::{Error, ErrorKind, Result};
pub use fulfillment::{FulfillmentRecord, FulfillmentStatus, FulfillmentStore};
pub use processor::{PaymentProcessor, StripeClient};
pub use release::{ConfirmOutcome, FinalizeOutcome, RedirectTarget, ReleaseCoordinator};
pub use reset::ResetSignal;
pub use resolver::SessionStatusResolver;
pub use webhook::{SignatureVerifier, WebhookIngester};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
