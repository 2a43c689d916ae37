//! Filesystem fulfillment store
//!
//! Layout under the store root:
//!
//! ```text
//! sessions/{session_id}/record.json   created once, never rewritten
//! sessions/{session_id}/confirmed     RFC 3339 timestamp of pending -> confirmed
//! sessions/{session_id}/released      RFC 3339 timestamp of confirmed -> released
//! by-document/{document_id}/{session_id}
//! tmp/
//! ```
//!
//! Every file is written in full to `tmp/` and then hard-linked into place.
//! Linking fails if the target exists, so each marker is published at most
//! once, with complete contents, even when several processes share the
//! directory. That exclusive publish is the compare-and-set.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::documents::validate_document_id;
use crate::error::{Error, Result};
use crate::fulfillment::{
    next_status, validate_session_id, FulfillmentRecord, FulfillmentStatus, FulfillmentStore,
    Transition,
};

const RECORD_FILE: &str = "record.json";
const CONFIRMED_MARKER: &str = "confirmed";
const RELEASED_MARKER: &str = "released";

/// Immutable part of a record, written once at creation
#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    session_id: String,
    document_id: String,
    created_at: DateTime<Utc>,
}

/// Directory-backed fulfillment table
#[derive(Debug, Clone)]
pub struct FsFulfillmentStore {
    root: PathBuf,
}

impl FsFulfillmentStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["sessions", "by-document", "tmp"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join("sessions").join(session_id)
    }

    fn document_index(&self, document_id: &str) -> PathBuf {
        self.root.join("by-document").join(document_id)
    }

    /// Publish `contents` at `target` unless something is already there.
    /// Returns `false` when another writer got there first.
    async fn publish(&self, target: &Path, contents: &[u8]) -> Result<bool> {
        let temp = self
            .root
            .join("tmp")
            .join(uuid::Uuid::new_v4().to_string());
        if let Err(err) = tokio::fs::write(&temp, contents).await {
            remove_temp(&temp).await;
            return Err(err.into());
        }

        let linked = tokio::fs::hard_link(&temp, target).await;
        remove_temp(&temp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_marker(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(|e| Error::storage(format!("corrupt marker {}: {e}", path.display()))),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn load(&self, session_id: &str) -> Result<Option<FulfillmentRecord>> {
        let dir = self.session_dir(session_id);
        let header: RecordHeader = match tokio::fs::read(dir.join(RECORD_FILE)).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let confirmed_at = self.read_marker(&dir.join(CONFIRMED_MARKER)).await?;
        let released_at = self.read_marker(&dir.join(RELEASED_MARKER)).await?;

        let status = match (confirmed_at, released_at) {
            (_, Some(_)) => FulfillmentStatus::Released,
            (Some(_), None) => FulfillmentStatus::Confirmed,
            (None, None) => FulfillmentStatus::Pending,
        };

        Ok(Some(FulfillmentRecord {
            session_id: header.session_id,
            document_id: header.document_id,
            status,
            created_at: header.created_at,
            confirmed_at,
            released_at,
        }))
    }

    async fn load_existing(&self, session_id: &str) -> Result<FulfillmentRecord> {
        self.load(session_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("fulfillment for session {session_id}")))
    }
}

/// Best-effort removal of a scratch file; a leftover only wastes space
async fn remove_temp(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == IoErrorKind::NotFound => {}
        Err(err) => debug!(path = %path.display(), error = %err, "Temp file cleanup failed"),
    }
}

#[async_trait]
impl FulfillmentStore for FsFulfillmentStore {
    async fn get(&self, session_id: &str) -> Result<Option<FulfillmentRecord>> {
        validate_session_id(session_id)?;
        self.load(session_id).await
    }

    #[instrument(skip(self))]
    async fn insert_pending(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> Result<FulfillmentRecord> {
        validate_session_id(session_id)?;
        validate_document_id(document_id)?;

        // Index first so a published record is always discoverable by document
        let index = self.document_index(document_id);
        tokio::fs::create_dir_all(&index).await?;
        self.publish(&index.join(session_id), b"").await?;

        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        let header = RecordHeader {
            session_id: session_id.to_string(),
            document_id: document_id.to_string(),
            created_at: Utc::now(),
        };
        if self
            .publish(&dir.join(RECORD_FILE), &serde_json::to_vec(&header)?)
            .await?
        {
            debug!("Fulfillment record created");
        }

        self.load_existing(session_id).await
    }

    #[instrument(skip(self))]
    async fn advance(&self, session_id: &str, from: FulfillmentStatus) -> Result<Transition> {
        validate_session_id(session_id)?;
        let to = next_status(from)?;

        let current = self.load_existing(session_id).await?;
        if current.status != from {
            return Ok(Transition::Unchanged(current));
        }

        // `next_status` never yields Pending
        let marker = if to == FulfillmentStatus::Released {
            RELEASED_MARKER
        } else {
            CONFIRMED_MARKER
        };
        let stamp = Utc::now().to_rfc3339();
        let won = self
            .publish(&self.session_dir(session_id).join(marker), stamp.as_bytes())
            .await?;

        let record = self.load_existing(session_id).await?;
        Ok(if won {
            Transition::Applied(record)
        } else {
            Transition::Unchanged(record)
        })
    }

    async fn find_by_document(&self, document_id: &str) -> Result<Vec<FulfillmentRecord>> {
        if validate_document_id(document_id).is_err() {
            return Ok(Vec::new());
        }

        let mut entries = match tokio::fs::read_dir(self.document_index(document_id)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let session_id = entry.file_name().to_string_lossy().into_owned();
            if validate_session_id(&session_id).is_err() {
                continue;
            }
            // Index entries outlive a lost binding race; the record decides
            if let Some(record) = self.load(&session_id).await? {
                if record.document_id == document_id {
                    found.push(record);
                }
            }
        }
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}
