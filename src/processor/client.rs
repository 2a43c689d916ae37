//! Processor HTTP client
//!
//! Thin `reqwest` wrapper over the two processor endpoints this service
//! needs. Every call is a single attempt bounded by the configured timeout;
//! retrying is the caller's decision.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::processor::session::{CheckoutSession, CreateSessionParams, CreatedSession};
use crate::processor::PaymentProcessor;

/// Client for the processor's checkout session API
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: Url,
    secret_key: String,
}

/// Processor error envelope: `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

impl StripeClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(api_base: Url, secret_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("docgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            secret_key: secret_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| Error::Config(format!("invalid processor URL for {path}: {e}")))
    }

    /// Form fields for a session creation request
    fn session_form(params: &CreateSessionParams) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("success_url", params.success_url.clone()),
            ("cancel_url", params.cancel_url.clone()),
            ("client_reference_id", params.document_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", params.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                params.unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                params.product_name.clone(),
            ),
            ("metadata[documentId]", params.document_id.clone()),
            ("metadata[customerName]", params.customer_name.clone()),
        ]
    }

    /// Turn a non-success response into a typed error
    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .ok()
            .map(|envelope| {
                let message = envelope.error.message.unwrap_or_default();
                match envelope.error.error_type {
                    Some(kind) => format!("{kind}: {message}"),
                    None => message,
                }
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

        if status == StatusCode::NOT_FOUND {
            Error::NotFound(message)
        } else {
            Error::Processor {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, params), fields(document_id = %params.document_id))]
    async fn create_session(&self, params: &CreateSessionParams) -> Result<CreatedSession> {
        let url = self.endpoint("/v1/checkout/sessions")?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .form(&Self::session_form(params))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            warn!(error = %err, "Processor rejected session creation");
            return Err(err);
        }

        let session: CheckoutSession = response.json().await?;
        let url = session.url.clone().ok_or_else(|| Error::Processor {
            status: 200,
            message: "session created without a payment page URL".to_string(),
        })?;

        debug!(session_id = %session.id, "Checkout session created");
        Ok(CreatedSession {
            session_id: session.id,
            url,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let url = self.endpoint(&format!("/v1/checkout/sessions/{session_id}"))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let session: CheckoutSession = response.json().await?;
        debug!(
            status = ?session.status,
            payment_status = ?session.payment_status,
            "Checkout session retrieved"
        );
        Ok(session)
    }
}
