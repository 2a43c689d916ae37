//! Webhook ingestion: verify, de-duplicate, dispatch
//!
//! Processing is synchronous within the request: the processor only gets its
//! 2xx after `confirm` has been persisted, so a crash mid-dispatch results in
//! a redelivery rather than a lost confirmation.
//!
//! A verified event that can never be applied (a paid session without a
//! document, or one naming a different document than its record) is logged
//! and acknowledged. Only store and processor failures are handed back for
//! redelivery.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::metrics::global_metrics;
use crate::release::{ConfirmOutcome, ReleaseCoordinator};
use crate::webhook::events::WebhookEvent;
use crate::webhook::idempotency::{EventClaim, IdempotencyStore};
use crate::webhook::signature::SignatureVerifier;

/// What happened to an accepted delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event confirmed a session for the first time
    Confirmed {
        /// Confirmed session
        session_id: String,
        /// Document bound to it
        document_id: String,
    },
    /// The event named a session that was already confirmed or released
    AlreadyConfirmed {
        /// Session named by the event
        session_id: String,
    },
    /// The event carries no payment signal
    Ignored {
        /// Event type as sent
        event_type: String,
    },
    /// The event was verified but cannot be applied; acknowledged anyway
    Rejected {
        /// Why the event was dropped
        reason: String,
    },
    /// The event id was seen before
    Duplicate,
}

impl IngestOutcome {
    /// True when the delivery was short-circuited by the event cache
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Turns raw webhook deliveries into `confirm` calls
#[derive(Clone)]
pub struct WebhookIngester {
    verifier: SignatureVerifier,
    events: Arc<dyn IdempotencyStore>,
    coordinator: ReleaseCoordinator,
}

impl WebhookIngester {
    /// Create a new ingester
    pub fn new(
        verifier: SignatureVerifier,
        events: Arc<dyn IdempotencyStore>,
        coordinator: ReleaseCoordinator,
    ) -> Self {
        Self {
            verifier,
            events,
            coordinator,
        }
    }

    /// Process one delivery
    ///
    /// # Errors
    ///
    /// - `Error::SignatureInvalid` if the header is missing or does not
    ///   verify; the payload is not parsed
    /// - `Error::Validation` if a verified payload does not parse as an event
    /// - store errors from `confirm`; the event id is released so the
    ///   processor's retry is processed
    #[instrument(skip_all, fields(event_id))]
    pub async fn ingest(&self, payload: &[u8], signature: Option<&str>) -> Result<IngestOutcome> {
        let event = match self.verify_and_parse(payload, signature) {
            Ok(event) => event,
            Err(err) => {
                global_metrics().record_webhook_rejected();
                return Err(err);
            }
        };
        global_metrics().record_webhook_event();

        tracing::Span::current().record("event_id", event.id.as_str());
        debug!(event_type = %event.event_type, "Webhook verified");

        if self.events.check_and_record(&event.id).await? == EventClaim::Duplicate {
            global_metrics().record_webhook_duplicate();
            info!(event_id = %event.id, "Duplicate webhook delivery");
            return Ok(IngestOutcome::Duplicate);
        }

        match self.dispatch(&event).await {
            Ok(outcome) => {
                self.events.mark_completed(&event.id).await?;
                Ok(outcome)
            }
            Err(err) if err.kind() == ErrorKind::Validation => {
                global_metrics().record_webhook_unusable();
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "Webhook event cannot be applied, acknowledging"
                );
                self.events.mark_completed(&event.id).await?;
                Ok(IngestOutcome::Rejected {
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "Webhook dispatch failed");
                if let Err(forget_err) = self.events.forget(&event.id).await {
                    warn!(error = %forget_err, "Failed to release event id");
                }
                Err(err)
            }
        }
    }

    fn verify_and_parse(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        let header = signature
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::SignatureInvalid("missing signature header".to_string()))?;
        self.verifier.verify(payload, header)?;
        WebhookEvent::from_bytes(payload)
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<IngestOutcome> {
        let Some(signal) = event.payment_signal()? else {
            debug!(event_type = %event.event_type, "Webhook event ignored");
            return Ok(IngestOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        };

        let outcome = self
            .coordinator
            .confirm(&signal.session_id, &signal.document_id)
            .await?;

        Ok(match outcome {
            ConfirmOutcome::Confirmed(record) => IngestOutcome::Confirmed {
                session_id: record.session_id,
                document_id: record.document_id,
            },
            ConfirmOutcome::AlreadyConfirmed(record) | ConfirmOutcome::AlreadyReleased(record) => {
                IngestOutcome::AlreadyConfirmed {
                    session_id: record.session_id,
                }
            }
        })
    }
}
