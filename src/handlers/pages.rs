//! Small server-rendered HTML pages for browser-facing routes

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n\
         <style>body{{font-family:system-ui,sans-serif;max-width:36rem;margin:4rem auto;padding:0 1rem;color:#222}}</style>\n\
         </head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// Shown for a missing document, an unreleased document, or a bad id
pub fn not_found_page(document_id: &str) -> Response {
    let id = htmlescape::encode_minimal(document_id);
    let body = format!(
        "<h1>Document not available</h1>\n\
         <p>We could not find a purchased document named <code>{id}</code>.</p>\n\
         <p>If you just completed a payment, reload this page in a few seconds.</p>"
    );
    (
        StatusCode::NOT_FOUND,
        [(header::CACHE_CONTROL, "no-store")],
        Html(page("Document not available", &body)),
    )
        .into_response()
}

/// Shown when a purchase was abandoned or could not be confirmed
pub fn cancelled_page(document_id: Option<&str>) -> Response {
    let detail = match document_id.map(str::trim).filter(|d| !d.is_empty()) {
        Some(id) => format!(
            "<p>Your purchase of <code>{}</code> was not completed.</p>",
            htmlescape::encode_minimal(id)
        ),
        None => "<p>Your purchase was not completed.</p>".to_string(),
    };
    let body = format!(
        "<h1>Payment not completed</h1>\n{detail}\n\
         <p>No charge was confirmed. If you were charged, contact support with your receipt.</p>"
    );
    Html(page("Payment not completed", &body)).into_response()
}
