//! `GET /payment/status` and `GET /payment/cancelled`

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::handlers::pages::cancelled_page;
use crate::handlers::AppState;
use crate::resolver::SessionStatusView;

/// Query for the status lookup
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Session to look up
    pub session_id: Option<String>,
}

/// Query carried by the processor's cancel redirect
#[derive(Debug, Default, Deserialize)]
pub struct CancelledQuery {
    /// Document the buyer was paying for
    pub filename: Option<String>,
}

/// Live session status from the processor
///
/// Read-only: does not touch fulfillment records. 400 without a
/// `session_id`, 404 for an unknown session, 5xx on processor failure.
#[instrument(skip_all)]
pub async fn payment_status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SessionStatusView>> {
    let session_id = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation("session_id is required"))?;

    let session = state.resolver.resolve(session_id).await?;
    Ok(Json(SessionStatusView::from(&session)))
}

/// Cancellation page
#[instrument(skip_all)]
pub async fn payment_cancelled_handler(Query(query): Query<CancelledQuery>) -> Response {
    cancelled_page(query.filename.as_deref())
}
