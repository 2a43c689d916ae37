//! Release coordinator
//!
//! The single authority over fulfillment records. Two independent signals
//! can report a payment: the processor's webhook (push) and the status pull
//! made when the buyer's browser returns (pull). They arrive in any order,
//! possibly more than once, possibly concurrently. Both funnel into
//! [`ReleaseCoordinator::confirm`], which is a compare-and-set on the record,
//! and only [`ReleaseCoordinator::finalize`] moves a record to `released`.
//!
//! ```text
//! webhook ──verify──▶ confirm(session, document) ─┐
//!                                                 ▼
//!                                   pending ──▶ confirmed ──▶ released
//!                                                 ▲               ▲
//! browser ──▶ finalize(session, filename) ── pull ┘───────────────┘
//!                    │
//!                    └─ any doubt ──▶ cancellation redirect
//! ```
//!
//! `finalize` fails closed: a missing parameter, an unknown session, an
//! unpaid or mismatched session, or any processor or store error routes the
//! browser to the cancellation page and leaves the record untouched.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::documents::validate_document_id;
use crate::error::{Error, ErrorKind, Result};
use crate::fulfillment::{
    validate_session_id, FulfillmentRecord, FulfillmentStatus, FulfillmentStore, Transition,
};
use crate::metrics::global_metrics;
use crate::reset::ResetSignal;
use crate::resolver::SessionStatusResolver;

/// Route that serves released documents
pub const VIEWER_PATH_PREFIX: &str = "/documents";

/// Route shown when a purchase cannot be completed
pub const CANCELLATION_PATH: &str = "/payment/cancelled";

/// What a call to `confirm` found and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// This call moved the record from pending to confirmed
    Confirmed(FulfillmentRecord),
    /// The record was already confirmed; nothing changed
    AlreadyConfirmed(FulfillmentRecord),
    /// The record was already released; nothing changed
    AlreadyReleased(FulfillmentRecord),
}

impl ConfirmOutcome {
    /// The record after the call
    pub fn record(&self) -> &FulfillmentRecord {
        match self {
            Self::Confirmed(r) | Self::AlreadyConfirmed(r) | Self::AlreadyReleased(r) => r,
        }
    }

    /// True only for the call that performed the transition
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    fn from_existing(record: FulfillmentRecord) -> Self {
        match record.status {
            FulfillmentStatus::Released => Self::AlreadyReleased(record),
            _ => Self::AlreadyConfirmed(record),
        }
    }
}

/// Why a finalize call routed to cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// `session_id` or `filename` absent or malformed
    MissingParameter,
    /// The processor does not report the session as paid
    NotPaid,
    /// The processor does not know the session
    UnknownSession,
    /// The session is bound to a different document
    DocumentMismatch,
    /// The processor could not be queried
    ProcessorError,
    /// The fulfillment store failed
    StoreError,
}

impl CancelReason {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::NotPaid => "not_paid",
            Self::UnknownSession => "unknown_session",
            Self::DocumentMismatch => "document_mismatch",
            Self::ProcessorError => "processor_error",
            Self::StoreError => "store_error",
        }
    }

    fn from_error(err: &Error) -> Self {
        match err.kind() {
            ErrorKind::Validation => Self::MissingParameter,
            ErrorKind::NotFound => Self::UnknownSession,
            ErrorKind::Processor | ErrorKind::ProcessorUnavailable => Self::ProcessorError,
            _ => Self::StoreError,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the browser is sent after finalize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Payment confirmed: show the document
    Viewer {
        /// Released document
        document_id: String,
    },
    /// Anything else
    Cancellation {
        /// Why the purchase was not completed
        reason: CancelReason,
    },
}

impl RedirectTarget {
    /// Path-and-query to put in the `Location` header
    pub fn location(&self) -> String {
        match self {
            Self::Viewer { document_id } => format!("{VIEWER_PATH_PREFIX}/{document_id}"),
            Self::Cancellation { .. } => CANCELLATION_PATH.to_string(),
        }
    }

    /// True for the document viewer
    pub fn is_viewer(&self) -> bool {
        matches!(self, Self::Viewer { .. })
    }
}

/// Result of a finalize call; never an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Redirect destination
    pub target: RedirectTarget,
    /// Client reset signal, present only on success
    pub reset: Option<ResetSignal>,
}

impl FinalizeOutcome {
    fn cancel(reason: CancelReason) -> Self {
        global_metrics().record_cancellation(reason.as_str());
        Self {
            target: RedirectTarget::Cancellation { reason },
            reset: None,
        }
    }
}

/// Merges push and pull payment signals into one release decision
#[derive(Clone)]
pub struct ReleaseCoordinator {
    store: Arc<dyn FulfillmentStore>,
    resolver: SessionStatusResolver,
    secure_cookies: bool,
}

impl ReleaseCoordinator {
    /// Create a new coordinator
    pub fn new(store: Arc<dyn FulfillmentStore>, resolver: SessionStatusResolver) -> Self {
        Self {
            store,
            resolver,
            secure_cookies: false,
        }
    }

    /// Mark the reset cookie `Secure`
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// The fulfillment store this coordinator owns
    pub fn store(&self) -> &Arc<dyn FulfillmentStore> {
        &self.store
    }

    /// Record a paid signal for a session
    ///
    /// Idempotent: the first call for a session moves it pending -> confirmed,
    /// every later call (and every concurrent loser) is a no-op reported as
    /// `AlreadyConfirmed` or `AlreadyReleased`.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for malformed ids, or if the session is already
    ///   bound to a different document
    /// - store errors
    #[instrument(skip(self))]
    pub async fn confirm(&self, session_id: &str, document_id: &str) -> Result<ConfirmOutcome> {
        validate_session_id(session_id)?;
        validate_document_id(document_id)?;

        let record = self.store.insert_pending(session_id, document_id).await?;
        if record.document_id != document_id {
            warn!(
                bound_document_id = %record.document_id,
                "Confirm signal names a different document than the session record"
            );
            return Err(Error::validation(format!(
                "session {session_id} is bound to another document"
            )));
        }

        if record.status != FulfillmentStatus::Pending {
            return Ok(ConfirmOutcome::from_existing(record));
        }

        Ok(
            match self.store.advance(session_id, FulfillmentStatus::Pending).await? {
                Transition::Applied(record) => {
                    global_metrics().record_confirmation();
                    info!("Payment confirmed");
                    ConfirmOutcome::Confirmed(record)
                }
                Transition::Unchanged(record) => {
                    debug!(status = %record.status, "Payment already confirmed");
                    ConfirmOutcome::from_existing(record)
                }
            },
        )
    }

    /// Decide where the returning browser goes
    ///
    /// Returns the viewer target (plus the reset signal) only when payment is
    /// confirmed, either already on record or by a fresh status pull. Never
    /// fails; every error becomes a cancellation.
    ///
    /// Without a `session_id` only the local records are consulted: the
    /// document is released if some session bound to it is confirmed. No
    /// status pull is possible in that case.
    #[instrument(skip(self))]
    pub async fn finalize(&self, session_id: Option<&str>, filename: Option<&str>) -> FinalizeOutcome {
        let session_id = session_id.map(str::trim).filter(|s| !s.is_empty());
        let filename = filename.map(str::trim).filter(|s| !s.is_empty());

        let Some(document_id) = filename else {
            debug!("Finalize without filename");
            return FinalizeOutcome::cancel(CancelReason::MissingParameter);
        };
        if validate_document_id(document_id).is_err()
            || session_id.is_some_and(|s| validate_session_id(s).is_err())
        {
            return FinalizeOutcome::cancel(CancelReason::MissingParameter);
        }

        let attempt = match session_id {
            Some(session_id) => self.try_release(session_id, document_id).await,
            None => self.try_release_document(document_id).await,
        };

        match attempt {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = CancelReason::from_error(&err);
                warn!(error = %err, reason = %reason, "Finalize failed closed");
                FinalizeOutcome::cancel(reason)
            }
        }
    }

    async fn try_release(&self, session_id: &str, document_id: &str) -> Result<FinalizeOutcome> {
        if let Some(record) = self.store.get(session_id).await? {
            if record.document_id != document_id {
                warn!(bound_document_id = %record.document_id, "Finalize for a different document");
                return Ok(FinalizeOutcome::cancel(CancelReason::DocumentMismatch));
            }
            if record.status.is_paid() {
                return self.release(record).await;
            }
        }

        // No confirmation on record yet: the webhook may still be in flight
        let session = self.resolver.resolve(session_id).await?;

        if !session.is_paid() {
            info!(payment_status = ?session.payment_status, "Session not paid");
            return Ok(FinalizeOutcome::cancel(CancelReason::NotPaid));
        }
        if session.document_id() != Some(document_id) {
            warn!(
                session_document_id = ?session.document_id(),
                "Paid session is bound to a different document"
            );
            return Ok(FinalizeOutcome::cancel(CancelReason::DocumentMismatch));
        }

        let confirmed = self.confirm(session_id, document_id).await?;
        self.release(confirmed.record().clone()).await
    }

    async fn try_release_document(&self, document_id: &str) -> Result<FinalizeOutcome> {
        // Released beats confirmed; among equals the newest session wins
        let paid = self
            .store
            .find_by_document(document_id)
            .await?
            .into_iter()
            .filter(|r| r.status.is_paid())
            .max_by_key(|r| (r.status, r.created_at));

        match paid {
            Some(record) => {
                debug!(session_id = %record.session_id, "Finalize matched session by document");
                self.release(record).await
            }
            None => {
                info!("No confirmed session for document");
                Ok(FinalizeOutcome::cancel(CancelReason::NotPaid))
            }
        }
    }

    async fn release(&self, record: FulfillmentRecord) -> Result<FinalizeOutcome> {
        let record = match record.status {
            FulfillmentStatus::Confirmed => {
                let transition = self
                    .store
                    .advance(&record.session_id, FulfillmentStatus::Confirmed)
                    .await?;
                if transition.was_applied() {
                    global_metrics().record_release();
                    info!(document_id = %record.document_id, "Document released");
                }
                transition.record().clone()
            }
            _ => record,
        };

        if record.status != FulfillmentStatus::Released {
            // Only reachable if a store reports a backward move
            return Err(Error::storage(format!(
                "session {} did not reach released (status {})",
                record.session_id, record.status
            )));
        }

        debug!(document_id = %record.document_id, "Redirecting to document viewer");
        Ok(FinalizeOutcome {
            target: RedirectTarget::Viewer {
                document_id: record.document_id,
            },
            reset: Some(ResetSignal::new().secure(self.secure_cookies)),
        })
    }
}
