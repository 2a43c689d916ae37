//! `POST /webhook`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::handlers::AppState;
use crate::webhook::SIGNATURE_HEADER;

/// Acknowledgement body
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    /// Always true on a 2xx
    pub received: bool,
    /// Set when the event id was already processed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// Receive a processor event
///
/// The body is taken as raw bytes; it must not be parsed before the
/// signature is checked.
#[instrument(skip_all)]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.ingester.ingest(&body, signature).await?;

    Ok(Json(WebhookAck {
        received: true,
        duplicate: outcome.is_duplicate(),
    }))
}
