//! Fulfillment records
//!
//! One record per checkout session, moving strictly forward through
//! `pending -> confirmed -> released`. Stores expose a single atomic
//! compare-and-set ([`FulfillmentStore::advance`]); the release coordinator is
//! the only writer.

pub mod fs;
pub mod memory;

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use fs::FsFulfillmentStore;
pub use memory::InMemoryFulfillmentStore;

/// Fulfillment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Session known, payment not yet confirmed
    Pending,
    /// Payment confirmed by webhook or status pull
    Confirmed,
    /// Document handed to the buyer
    Released,
}

impl FulfillmentStatus {
    /// The only state this one may advance to
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Released),
            Self::Released => None,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Released => "released",
        }
    }

    /// Payment has been confirmed (possibly already released)
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Released)
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted fulfillment state for one checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    /// Processor session id (record key)
    pub session_id: String,
    /// Document bound to the session
    pub document_id: String,
    /// Current state
    pub status: FulfillmentStatus,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When payment was confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the document was released
    pub released_at: Option<DateTime<Utc>>,
}

impl FulfillmentRecord {
    /// A fresh pending record
    pub fn pending(session_id: &str, document_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            document_id: document_id.to_string(),
            status: FulfillmentStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
            released_at: None,
        }
    }

    /// Apply a forward step, stamping the transition time
    fn apply(&mut self, to: FulfillmentStatus, at: DateTime<Utc>) {
        match to {
            FulfillmentStatus::Confirmed => self.confirmed_at = Some(at),
            FulfillmentStatus::Released => self.released_at = Some(at),
            FulfillmentStatus::Pending => {}
        }
        self.status = to;
    }
}

/// Result of a compare-and-set on a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The record was in the expected state and has moved forward
    Applied(FulfillmentRecord),
    /// The record was not in the expected state; nothing changed
    Unchanged(FulfillmentRecord),
}

impl Transition {
    /// The record after the operation
    pub fn record(&self) -> &FulfillmentRecord {
        match self {
            Self::Applied(record) | Self::Unchanged(record) => record,
        }
    }

    /// True when this call performed the transition
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Persistent table of fulfillment records keyed by session id
#[async_trait]
pub trait FulfillmentStore: Send + Sync + 'static {
    /// Load a record
    async fn get(&self, session_id: &str) -> Result<Option<FulfillmentRecord>>;

    /// Create a pending record unless one already exists; returns the stored record
    async fn insert_pending(&self, session_id: &str, document_id: &str)
        -> Result<FulfillmentRecord>;

    /// Atomically move a record from `from` to `from.next()`
    ///
    /// At most one caller observes `Transition::Applied` for a given step,
    /// however many race.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if no record exists.
    async fn advance(&self, session_id: &str, from: FulfillmentStatus) -> Result<Transition>;

    /// Every record bound to `document_id`, oldest first
    ///
    /// An id that cannot name a document yields an empty list.
    async fn find_by_document(&self, document_id: &str) -> Result<Vec<FulfillmentRecord>>;

    /// True if any session bound to `document_id` has been released
    async fn is_released(&self, document_id: &str) -> Result<bool> {
        Ok(self
            .find_by_document(document_id)
            .await?
            .iter()
            .any(|r| r.status == FulfillmentStatus::Released))
    }
}

fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,255}$").expect("static regex"))
}

/// Check that a session id is safe to use as a record key
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id_pattern().is_match(session_id) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid session id {session_id:?}")))
    }
}

/// The step after `from`, or an error if `from` is terminal
pub(crate) fn next_status(from: FulfillmentStatus) -> Result<FulfillmentStatus> {
    from.next()
        .ok_or_else(|| Error::storage(format!("no transition out of {from}")))
}
