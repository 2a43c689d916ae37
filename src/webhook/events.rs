//! Webhook event types
//!
//! Strongly-typed view of the processor's event envelope. Only checkout
//! session events carry a payment signal; everything else is acknowledged and
//! ignored.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processor::CheckoutSession;

/// Event types this service recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Buyer finished the payment page
    #[serde(rename = "checkout.session.completed")]
    CheckoutSessionCompleted,
    /// A delayed payment method settled
    #[serde(rename = "checkout.session.async_payment_succeeded")]
    CheckoutSessionAsyncPaymentSucceeded,
    /// A delayed payment method failed
    #[serde(rename = "checkout.session.async_payment_failed")]
    CheckoutSessionAsyncPaymentFailed,
    /// Session expired unpaid
    #[serde(rename = "checkout.session.expired")]
    CheckoutSessionExpired,
    /// Any other event type
    #[serde(other)]
    Unknown,
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "checkout.session.async_payment_succeeded" => {
                Self::CheckoutSessionAsyncPaymentSucceeded
            }
            "checkout.session.async_payment_failed" => Self::CheckoutSessionAsyncPaymentFailed,
            "checkout.session.expired" => Self::CheckoutSessionExpired,
            _ => Self::Unknown,
        })
    }
}

impl EventType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CheckoutSessionAsyncPaymentSucceeded => {
                "checkout.session.async_payment_succeeded"
            }
            Self::CheckoutSessionAsyncPaymentFailed => "checkout.session.async_payment_failed",
            Self::CheckoutSessionExpired => "checkout.session.expired",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the event's object is a checkout session
    pub fn is_checkout_session(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether the event can signal a completed payment
    pub fn can_confirm(&self) -> bool {
        matches!(
            self,
            Self::CheckoutSessionCompleted | Self::CheckoutSessionAsyncPaymentSucceeded
        )
    }
}

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique event id (evt_...); the processor reuses it on redelivery
    pub id: String,

    /// Event type as sent
    #[serde(rename = "type")]
    pub event_type: String,

    /// Creation time (unix seconds)
    #[serde(default)]
    pub created: i64,

    /// Live or test mode
    #[serde(default)]
    pub livemode: bool,

    /// Event payload
    pub data: EventData,
}

/// Event data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The object the event is about
    pub object: serde_json::Value,
}

/// A verified "this session is paid" signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSignal {
    /// Event that carried the signal
    pub event_id: String,
    /// Paid session
    pub session_id: String,
    /// Document bound to the session at creation
    pub document_id: String,
}

impl WebhookEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::validation(format!("malformed webhook event: {e}")))
    }

    /// Typed event type
    pub fn typed_event_type(&self) -> EventType {
        match EventType::from_str(&self.event_type) {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }

    /// Decode the event object as a checkout session
    pub fn as_checkout_session(&self) -> Result<CheckoutSession> {
        if !self.typed_event_type().is_checkout_session() {
            return Err(Error::validation(format!(
                "event {} is not a checkout session event",
                self.event_type
            )));
        }
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| Error::validation(format!("malformed checkout session: {e}")))
    }

    /// Extract a payment signal, if this event carries one
    ///
    /// `Ok(None)` for events that do not confirm anything: other types, or a
    /// completed session whose payment is still pending (delayed methods
    /// confirm later via `async_payment_succeeded`).
    ///
    /// # Errors
    ///
    /// `Error::Validation` if a confirming event is paid but has no usable
    /// session object or document id.
    pub fn payment_signal(&self) -> Result<Option<PaymentSignal>> {
        if !self.typed_event_type().can_confirm() {
            return Ok(None);
        }

        let session = self.as_checkout_session()?;
        if !session.is_paid() {
            return Ok(None);
        }

        let document_id = session.document_id().ok_or_else(|| {
            Error::validation(format!("paid session {} has no documentId", session.id))
        })?;

        Ok(Some(PaymentSignal {
            event_id: self.id.clone(),
            session_id: session.id.clone(),
            document_id: document_id.to_string(),
        }))
    }
}
