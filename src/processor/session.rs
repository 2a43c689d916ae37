//! Checkout session types
//!
//! Strongly-typed view of the processor's checkout session object. Sessions
//! are read-only from this service's perspective; only the processor moves
//! them between states.

use serde::{Deserialize, Serialize};

/// Label used when the buyer did not supply a name
pub const DEFAULT_CUSTOMER_NAME: &str = "Customer";

/// Lifecycle state of a checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Payment page still usable
    Open,
    /// Buyer finished the payment page
    Complete,
    /// Session timed out
    Expired,
    /// Status this service does not know
    #[serde(other)]
    Unknown,
}

/// Payment state of a checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No funds captured
    Unpaid,
    /// Funds captured
    Paid,
    /// Session needed no payment (100% discount, free trial)
    NoPaymentRequired,
    /// Status this service does not know
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Only an explicit `paid` releases a document
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// Metadata attached to every session this service creates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Document the buyer is paying for
    #[serde(rename = "documentId", default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    /// Buyer-supplied display name
    #[serde(rename = "customerName", default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

/// Processor checkout session object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session ID (cs_...)
    pub id: String,

    /// Session lifecycle status
    #[serde(default = "unknown_status")]
    pub status: SessionStatus,

    /// Payment status
    pub payment_status: PaymentStatus,

    /// Metadata attached at creation
    #[serde(default)]
    pub metadata: SessionMetadata,

    /// Hosted payment page URL (absent once the session is complete)
    #[serde(default)]
    pub url: Option<String>,

    /// Customer email collected on the payment page
    #[serde(default)]
    pub customer_email: Option<String>,

    /// Customer details block; newer API versions put the email here
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

fn unknown_status() -> SessionStatus {
    SessionStatus::Unknown
}

/// Customer details collected by the hosted payment page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Customer email
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name
    #[serde(default)]
    pub name: Option<String>,
}

impl CheckoutSession {
    /// True when the processor reports the session as paid
    pub fn is_paid(&self) -> bool {
        self.payment_status.is_paid()
    }

    /// Document id bound to the session at creation
    pub fn document_id(&self) -> Option<&str> {
        self.metadata
            .document_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Best known customer email
    pub fn email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|d| d.email.as_deref())
        })
    }
}

/// Parameters for opening a new checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionParams {
    /// Document the session pays for
    pub document_id: String,
    /// Display name stored in metadata
    pub customer_name: String,
    /// Line item price in the smallest currency unit
    pub unit_amount: u64,
    /// ISO currency code
    pub currency: String,
    /// Line item product name
    pub product_name: String,
    /// Redirect target after payment; may contain `{CHECKOUT_SESSION_ID}`
    pub success_url: String,
    /// Redirect target when the buyer abandons the payment page
    pub cancel_url: String,
}

/// Result of a successful session creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// Processor session id
    pub session_id: String,
    /// Hosted payment page URL
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_object() {
        let json = r#"{
            "id": "cs_test_a1",
            "object": "checkout.session",
            "status": "complete",
            "payment_status": "paid",
            "metadata": {"documentId": "letter_of_demand_123", "customerName": "Ada"},
            "url": null,
            "customer_details": {"email": "ada@example.com", "name": "Ada"}
        }"#;

        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.status, SessionStatus::Complete);
        assert!(session.is_paid());
        assert_eq!(session.document_id(), Some("letter_of_demand_123"));
        assert_eq!(session.email(), Some("ada@example.com"));
    }

    #[test]
    fn test_unknown_statuses_are_not_paid() {
        let json = r#"{"id": "cs_1", "status": "weird", "payment_status": "processing"}"#;
        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.status, SessionStatus::Unknown);
        assert_eq!(session.payment_status, PaymentStatus::Unknown);
        assert!(!session.is_paid());
    }

    #[test]
    fn test_no_payment_required_is_not_paid() {
        assert!(!PaymentStatus::NoPaymentRequired.is_paid());
        assert!(!PaymentStatus::Unpaid.is_paid());
        assert!(PaymentStatus::Paid.is_paid());
    }

    #[test]
    fn test_empty_document_id_is_absent() {
        let json = r#"{"id": "cs_1", "payment_status": "paid", "metadata": {"documentId": ""}}"#;
        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.document_id(), None);
    }
}
