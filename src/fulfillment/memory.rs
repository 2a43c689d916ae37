//! In-memory fulfillment store
//!
//! A mutex-guarded map. Every read-modify-write happens under one lock
//! acquisition, which is what makes `advance` a compare-and-set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::fulfillment::{
    next_status, FulfillmentRecord, FulfillmentStatus, FulfillmentStore, Transition,
};

/// Map-backed fulfillment table for a single process
#[derive(Debug, Default)]
pub struct InMemoryFulfillmentStore {
    records: Mutex<HashMap<String, FulfillmentRecord>>,
}

impl InMemoryFulfillmentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when no record exists
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryFulfillmentStore {
    async fn get(&self, session_id: &str) -> Result<Option<FulfillmentRecord>> {
        Ok(self.records.lock().get(session_id).cloned())
    }

    async fn insert_pending(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> Result<FulfillmentRecord> {
        let mut records = self.records.lock();
        let record = records
            .entry(session_id.to_string())
            .or_insert_with(|| FulfillmentRecord::pending(session_id, document_id));
        Ok(record.clone())
    }

    async fn advance(&self, session_id: &str, from: FulfillmentStatus) -> Result<Transition> {
        let to = next_status(from)?;
        let mut records = self.records.lock();
        let record = records
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found(format!("fulfillment for session {session_id}")))?;

        if record.status != from {
            return Ok(Transition::Unchanged(record.clone()));
        }

        record.apply(to, Utc::now());
        Ok(Transition::Applied(record.clone()))
    }

    async fn find_by_document(&self, document_id: &str) -> Result<Vec<FulfillmentRecord>> {
        let mut found: Vec<_> = self
            .records
            .lock()
            .values()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_pending_is_idempotent() {
        let store = InMemoryFulfillmentStore::new();
        let first = store.insert_pending("cs_1", "doc_1").await.unwrap();
        let second = store.insert_pending("cs_1", "doc_other").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.document_id, "doc_1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_advance_steps_forward_once() {
        let store = InMemoryFulfillmentStore::new();
        store.insert_pending("cs_1", "doc_1").await.unwrap();

        let t = store.advance("cs_1", FulfillmentStatus::Pending).await.unwrap();
        assert!(t.was_applied());
        assert_eq!(t.record().status, FulfillmentStatus::Confirmed);

        let t = store.advance("cs_1", FulfillmentStatus::Pending).await.unwrap();
        assert!(!t.was_applied());
        assert_eq!(t.record().status, FulfillmentStatus::Confirmed);

        let t = store.advance("cs_1", FulfillmentStatus::Confirmed).await.unwrap();
        assert!(t.was_applied());
        assert!(store.is_released("doc_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_document() {
        let store = InMemoryFulfillmentStore::new();
        store.insert_pending("cs_1", "doc_1").await.unwrap();
        store.insert_pending("cs_2", "doc_2").await.unwrap();
        store.insert_pending("cs_3", "doc_1").await.unwrap();

        let ids: Vec<_> = store
            .find_by_document("doc_1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"cs_1".to_string()));
        assert!(ids.contains(&"cs_3".to_string()));
        assert!(store.find_by_document("doc_9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_advance_missing_is_not_found() {
        let store = InMemoryFulfillmentStore::new();
        let err = store
            .advance("cs_missing", FulfillmentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_released_is_terminal() {
        let store = InMemoryFulfillmentStore::new();
        assert!(store
            .advance("cs_1", FulfillmentStatus::Released)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_advance_applies_once() {
        let store = Arc::new(InMemoryFulfillmentStore::new());
        store.insert_pending("cs_race", "doc_1").await.unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .advance("cs_race", FulfillmentStatus::Pending)
                        .await
                        .unwrap()
                        .was_applied()
                })
            })
            .collect();

        let applied = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(applied, 1);
    }
}
