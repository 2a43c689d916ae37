//! Checkout session broker
//!
//! Opens a processor-hosted payment session for a document. The session
//! carries `{documentId, customerName}` as metadata so that both confirmation
//! paths can recover which document was paid for.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::AppConfig;
use crate::documents::validate_document_id;
use crate::error::{Error, Result};
use crate::metrics::global_metrics;
use crate::processor::{
    CreateSessionParams, CreatedSession, PaymentProcessor, DEFAULT_CUSTOMER_NAME,
};

/// Placeholder the processor replaces with the real session id on redirect
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// `POST /checkout` request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Document to pay for
    #[serde(default)]
    pub document_id: Option<String>,
    /// Optional buyer display name
    #[serde(default)]
    pub customer_name: Option<String>,
}

impl CheckoutRequest {
    /// Convenience constructor
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            customer_name: None,
        }
    }
}

/// Line item settings applied to every session
#[derive(Debug, Clone)]
pub struct PriceSettings {
    /// Amount in the smallest currency unit
    pub unit_amount: u64,
    /// ISO currency code
    pub currency: String,
    /// Product name shown on the payment page
    pub product_name: String,
}

/// Creates checkout sessions with the processor
#[derive(Clone)]
pub struct CheckoutSessionBroker {
    processor: Arc<dyn PaymentProcessor>,
    public_url: Url,
    price: PriceSettings,
}

impl CheckoutSessionBroker {
    /// Create a new broker
    pub fn new(processor: Arc<dyn PaymentProcessor>, public_url: Url, price: PriceSettings) -> Self {
        Self {
            processor,
            public_url,
            price,
        }
    }

    /// Create a broker from the service configuration
    pub fn from_config(processor: Arc<dyn PaymentProcessor>, config: &AppConfig) -> Self {
        Self::new(
            processor,
            config.public_url.clone(),
            PriceSettings {
                unit_amount: config.price_cents,
                currency: config.currency.clone(),
                product_name: config.product_name.clone(),
            },
        )
    }

    /// Open a session for the requested document
    ///
    /// # Errors
    ///
    /// - `Error::Validation` if `documentId` is missing, empty or malformed
    /// - `Error::Processor` / `Error::ProcessorUnavailable` if the processor
    ///   rejects the request or cannot be reached (no retry here)
    #[instrument(skip_all)]
    pub async fn create(&self, request: CheckoutRequest) -> Result<CreatedSession> {
        let document_id = request
            .document_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::validation("documentId is required"))?;
        validate_document_id(document_id)?;

        let customer_name = request
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CUSTOMER_NAME)
            .to_string();

        let params = CreateSessionParams {
            document_id: document_id.to_string(),
            customer_name,
            unit_amount: self.price.unit_amount,
            currency: self.price.currency.clone(),
            product_name: self.price.product_name.clone(),
            success_url: self.success_url(document_id),
            cancel_url: self.cancel_url(document_id),
        };

        match self.processor.create_session(&params).await {
            Ok(created) => {
                global_metrics().record_checkout_session();
                info!(
                    session_id = %created.session_id,
                    document_id = %document_id,
                    "Checkout session opened"
                );
                Ok(created)
            }
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "Checkout session creation failed");
                Err(err)
            }
        }
    }

    /// Redirect target after a completed payment
    ///
    /// The processor substitutes the session id placeholder itself, so it
    /// must survive URL encoding verbatim.
    pub fn success_url(&self, document_id: &str) -> String {
        let mut url = self.public_url.clone();
        url.set_path("/finalize");
        url.query_pairs_mut().clear().append_pair("filename", document_id);
        format!("{url}&session_id={SESSION_ID_PLACEHOLDER}")
    }

    /// Redirect target when the buyer leaves the payment page
    pub fn cancel_url(&self, document_id: &str) -> String {
        let mut url = self.public_url.clone();
        url.set_path(crate::release::CANCELLATION_PATH);
        url.query_pairs_mut().clear().append_pair("filename", document_id);
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::InMemoryProcessor;

    fn broker() -> (Arc<InMemoryProcessor>, CheckoutSessionBroker) {
        let processor = Arc::new(InMemoryProcessor::new());
        let broker = CheckoutSessionBroker::from_config(processor.clone(), &AppConfig::test_config());
        (processor, broker)
    }

    #[tokio::test]
    async fn test_create_session() {
        let (processor, broker) = broker();
        let created = broker
            .create(CheckoutRequest::for_document("letter_of_demand_123"))
            .await
            .unwrap();

        assert!(created.session_id.starts_with("cs_test_"));
        assert!(created.url.contains(&created.session_id));

        let session = processor.retrieve_session(&created.session_id).await.unwrap();
        assert_eq!(session.document_id(), Some("letter_of_demand_123"));
        assert_eq!(
            session.metadata.customer_name.as_deref(),
            Some(DEFAULT_CUSTOMER_NAME)
        );
    }

    #[tokio::test]
    async fn test_customer_name_is_kept() {
        let (processor, broker) = broker();
        let created = broker
            .create(CheckoutRequest {
                document_id: Some("doc_1".into()),
                customer_name: Some("  Grace Hopper ".into()),
            })
            .await
            .unwrap();

        let session = processor.retrieve_session(&created.session_id).await.unwrap();
        assert_eq!(session.metadata.customer_name.as_deref(), Some("Grace Hopper"));
    }

    #[tokio::test]
    async fn test_missing_document_id_is_validation_error() {
        let (processor, broker) = broker();

        let err = broker.create(CheckoutRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = broker
            .create(CheckoutRequest::for_document("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Validation happens before any processor call
        assert_eq!(processor.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_processor_outage_is_surfaced_once() {
        let (processor, broker) = broker();
        processor.set_unavailable(true);

        let err = broker
            .create(CheckoutRequest::for_document("doc_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProcessorUnavailable(_)));
        assert_eq!(processor.create_calls(), 1);
    }

    #[test]
    fn test_redirect_urls() {
        let (_, broker) = broker();
        assert_eq!(
            broker.success_url("doc_1"),
            "http://localhost:3000/finalize?filename=doc_1&session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            broker.cancel_url("doc_1"),
            "http://localhost:3000/payment/cancelled?filename=doc_1"
        );
    }
}
