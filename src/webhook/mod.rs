//! Processor webhook handling
//!
//! ```text
//! POST /webhook ─▶ signature verify ─▶ event-id claim ─▶ confirm ─▶ 200
//!                        │                   │              │
//!                        ▼                   ▼              ▼
//!                       400           200 (duplicate)   5xx, id released
//! ```
//!
//! The verifier recomputes the HMAC over the raw, unparsed body; nothing in
//! a delivery is trusted until it verifies. Deliveries are processed inline
//! and acknowledged only after the confirmation is stored.

pub mod events;
pub mod idempotency;
pub mod ingest;
pub mod signature;

pub use events::{EventType, PaymentSignal, WebhookEvent};
pub use idempotency::{EventClaim, IdempotencyStore, InMemoryIdempotencyStore};
pub use ingest::{IngestOutcome, WebhookIngester};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
