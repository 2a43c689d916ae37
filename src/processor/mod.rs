//! Payment processor integration
//!
//! The processor is an external collaborator. Everything the service needs
//! from it goes through the [`PaymentProcessor`] trait: opening a checkout
//! session and reading a session's live status. [`StripeClient`] is the
//! production implementation; tests substitute their own.

pub mod client;
pub mod memory;
pub mod session;

use async_trait::async_trait;

use crate::error::Result;

pub use client::StripeClient;
pub use memory::InMemoryProcessor;
pub use session::{
    CheckoutSession, CreateSessionParams, CreatedSession, CustomerDetails, PaymentStatus,
    SessionMetadata, SessionStatus, DEFAULT_CUSTOMER_NAME,
};

/// Network operations against the payment processor
#[async_trait]
pub trait PaymentProcessor: Send + Sync + 'static {
    /// Open a checkout session with a hosted payment page
    async fn create_session(&self, params: &CreateSessionParams) -> Result<CreatedSession>;

    /// Read a session's current state from the processor
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession>;
}
