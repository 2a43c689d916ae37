//! `GET /documents/:id` and `PUT /documents/:id`
//!
//! Reads are gated on release: a document is served only once some
//! fulfillment for it has reached `released`. Anything else, including a
//! document that exists but was never paid for, gets the same 404 page.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::header::{
    AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_SECURITY_POLICY, CONTENT_TYPE,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::documents::{DocumentKey, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, ErrorKind, Result};
use crate::handlers::pages::not_found_page;
use crate::handlers::AppState;
use crate::security::{DOCUMENT_CACHE_CONTROL, DOCUMENT_CSP};

/// Body returned after an upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    /// Document id from the path
    pub document_id: String,
    /// Storage key derived from the id
    pub key: String,
    /// Stored size
    pub size: usize,
}

/// Serve a released document
#[instrument(skip(state))]
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Response {
    let Ok(key) = DocumentKey::for_document(&document_id) else {
        return not_found_page(&document_id);
    };

    match state.coordinator.store().is_released(&document_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("Document requested before release");
            return not_found_page(&document_id);
        }
        Err(err) => return err.into_response(),
    }

    match state.documents.get(&key).await {
        Ok(document) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, document.content_type.as_str()),
                (CACHE_CONTROL, DOCUMENT_CACHE_CONTROL),
                (CONTENT_SECURITY_POLICY, DOCUMENT_CSP),
            ],
            document.bytes,
        )
            .into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("Released document missing from store");
            not_found_page(&document_id)
        }
        Err(err) => err.into_response(),
    }
}

/// Store a document under its id
///
/// Requires `Authorization: Bearer <upload token>`. The request's
/// `Content-Type` is stored with the bytes (HTML by default).
#[instrument(skip(state, headers, body))]
pub async fn put_document_handler(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<StoredDocument>)> {
    state
        .upload_auth
        .authorize(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;

    let key = DocumentKey::for_document(&document_id)?;
    let limit = state.max_document_bytes;

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let size = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(limit + 1);
            Error::PayloadTooLarge { size, limit }
        } else {
            Error::validation(rejection.body_text())
        }
    })?;
    if body.len() > limit {
        return Err(Error::PayloadTooLarge {
            size: body.len(),
            limit,
        });
    }
    if body.is_empty() {
        return Err(Error::validation("document body is empty"));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    let size = body.len();
    state.documents.put(&key, body.to_vec(), content_type).await?;
    info!(size, content_type, "Document stored");

    Ok((
        StatusCode::CREATED,
        Json(StoredDocument {
            document_id,
            key: key.to_string(),
            size,
        }),
    ))
}
