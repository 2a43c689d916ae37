//! `GET /finalize`
//!
//! Landing point of the processor's success redirect. Always answers with a
//! 303; the coordinator decides between the document viewer and the
//! cancellation page.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::handlers::AppState;
use crate::release::RedirectTarget;

/// Query carried by the success redirect
#[derive(Debug, Default, Deserialize)]
pub struct FinalizeQuery {
    /// Session id substituted by the processor
    pub session_id: Option<String>,
    /// Document the buyer paid for
    pub filename: Option<String>,
}

/// Resolve the purchase and redirect
///
/// A query that does not parse (for example a repeated key) is treated as
/// carrying no parameters.
#[instrument(skip_all)]
pub async fn finalize_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FinalizeQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!(error = %rejection, "Unparseable finalize query");
            FinalizeQuery::default()
        }
    };
    let outcome = state
        .coordinator
        .finalize(query.session_id.as_deref(), query.filename.as_deref())
        .await;

    if let RedirectTarget::Cancellation { reason } = &outcome.target {
        info!(reason = %reason, "Finalize routed to cancellation");
    }

    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    let location = outcome.target.location();
    // Locations are built from validated ids and constant paths
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(LOCATION, value);
    }
    if let Some(reset) = &outcome.reset {
        reset.apply(headers);
    }
    response
}
