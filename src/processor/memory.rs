//! In-process processor for tests and local development
//!
//! Keeps sessions in a map and lets the caller flip them to paid, simulate an
//! outage, or inspect how many calls were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::processor::session::{
    CheckoutSession, CreateSessionParams, CreatedSession, PaymentStatus, SessionMetadata,
    SessionStatus,
};
use crate::processor::PaymentProcessor;

/// Processor double backed by a map of sessions
#[derive(Debug, Default)]
pub struct InMemoryProcessor {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    create_calls: AtomicU64,
    retrieve_calls: AtomicU64,
}

impl InMemoryProcessor {
    /// Create an empty processor
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session directly
    pub fn insert_session(&self, session: CheckoutSession) {
        self.sessions.lock().insert(session.id.clone(), session);
    }

    /// Mark a session as completed and paid
    pub fn mark_paid(&self, session_id: &str) -> bool {
        self.set_payment_status(session_id, SessionStatus::Complete, PaymentStatus::Paid)
    }

    /// Change a session's status fields
    pub fn set_payment_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        payment_status: PaymentStatus,
    ) -> bool {
        match self.sessions.lock().get_mut(session_id) {
            Some(session) => {
                session.status = status;
                session.payment_status = payment_status;
                true
            }
            None => false,
        }
    }

    /// Simulate a processor outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of session creations attempted
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of status pulls attempted
    pub fn retrieve_calls(&self) -> u64 {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::ProcessorUnavailable(
                "simulated processor outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryProcessor {
    async fn create_session(&self, params: &CreateSessionParams) -> Result<CreatedSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{n:06}");
        let url = format!("https://checkout.test/pay/{id}");

        self.insert_session(CheckoutSession {
            id: id.clone(),
            status: SessionStatus::Open,
            payment_status: PaymentStatus::Unpaid,
            metadata: SessionMetadata {
                document_id: Some(params.document_id.clone()),
                customer_name: Some(params.customer_name.clone()),
            },
            url: Some(url.clone()),
            customer_email: None,
            customer_details: None,
        });

        Ok(CreatedSession {
            session_id: id,
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("No such checkout session: {session_id}")))
    }
}
