//! Session status resolver
//!
//! The pull path: one synchronous lookup of a session's live state at the
//! processor. No retries; a browser reload is the natural retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::fulfillment::validate_session_id;
use crate::processor::{
    CheckoutSession, PaymentProcessor, PaymentStatus, SessionMetadata, SessionStatus,
};

/// Public view of a session returned by `GET /payment/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusView {
    /// Session lifecycle status
    pub status: SessionStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Customer email, when the payment page collected one
    pub customer_email: Option<String>,
    /// Metadata attached at creation
    pub metadata: SessionMetadata,
}

impl From<&CheckoutSession> for SessionStatusView {
    fn from(session: &CheckoutSession) -> Self {
        Self {
            status: session.status,
            payment_status: session.payment_status,
            customer_email: session.email().map(str::to_string),
            metadata: session.metadata.clone(),
        }
    }
}

/// Reads a session's authoritative status from the processor
#[derive(Clone)]
pub struct SessionStatusResolver {
    processor: Arc<dyn PaymentProcessor>,
}

impl SessionStatusResolver {
    /// Create a new resolver
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { processor }
    }

    /// Fetch the current session state
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for a malformed session id (no processor call)
    /// - `Error::NotFound` if the processor does not know the session
    /// - `Error::Processor` / `Error::ProcessorUnavailable` on processor failure
    #[instrument(skip(self))]
    pub async fn resolve(&self, session_id: &str) -> Result<CheckoutSession> {
        validate_session_id(session_id)?;

        match self.processor.retrieve_session(session_id).await {
            Ok(session) => {
                debug!(
                    status = ?session.status,
                    payment_status = ?session.payment_status,
                    "Session status resolved"
                );
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "Session status lookup failed");
                Err(err)
            }
        }
    }
}
