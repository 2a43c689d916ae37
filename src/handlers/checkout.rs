//! `POST /checkout`

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::checkout::CheckoutRequest;
use crate::error::{Error, Result};
use crate::handlers::AppState;
use crate::processor::CreatedSession;

/// Open a checkout session
///
/// Body `{documentId, customerName?}`; responds `{sessionId, url}`.
/// A missing or unreadable body is a validation error (400), like a missing
/// `documentId`.
#[instrument(skip_all)]
pub async fn create_checkout_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CreatedSession>> {
    let Json(request) = body.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let created = state.broker.create(request).await?;
    Ok(Json(created))
}
