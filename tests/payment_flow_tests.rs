//! End-to-end payment flow tests for docgate
//!
//! Drives the full router in-process with an in-memory processor and
//! in-memory stores.
//!
//! # Test Categories
//!
//! 1. **Checkout**: session creation and request validation
//! 2. **Webhook**: signature checks, confirmation, redelivery
//! 3. **Finalize**: redirects, reset cookie, pull-path confirmation
//! 4. **Documents**: release gating, uploads
//! 5. **Operations**: health, status, metrics
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --package docgate --test payment_flow_tests
//! ```

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use docgate::config::AppConfig;
use docgate::handlers::{router, AppState, Stores};
use docgate::processor::InMemoryProcessor;
use docgate::reset::RESET_COOKIE_NAME;
use docgate::webhook::{SignatureVerifier, SIGNATURE_HEADER};
use serde_json::{json, Value};
use tower::ServiceExt;

const UPLOAD_TOKEN: &str = "upload_test_token";

struct TestApp {
    app: Router,
    processor: Arc<InMemoryProcessor>,
    verifier: SignatureVerifier,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::test_config();
        let processor = Arc::new(InMemoryProcessor::new());
        let stores = Stores::in_memory(&config);
        let state = Arc::new(AppState::new(&config, processor.clone(), stores));
        Self {
            app: router(state),
            processor,
            verifier: SignatureVerifier::from_config(&config),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn checkout(&self, document_id: &str) -> String {
        let response = self
            .send(
                Request::post("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "documentId": document_id }).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        body["sessionId"].as_str().unwrap().to_string()
    }

    async fn upload(&self, document_id: &str, html: &str) -> Response {
        self.send(
            Request::put(format!("/documents/{document_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {UPLOAD_TOKEN}"))
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Body::from(html.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn deliver(&self, body: &[u8], signature: &str) -> Response {
        self.send(
            Request::post("/webhook")
                .header(SIGNATURE_HEADER, signature)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
    }

    fn sign(&self, body: &[u8]) -> String {
        self.verifier.sign(body, Utc::now().timestamp()).unwrap()
    }
}

fn completed_event(event_id: &str, session_id: &str, document_id: &str) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": {
            "id": session_id,
            "status": "complete",
            "payment_status": "paid",
            "metadata": { "documentId": document_id }
        }}
    })
    .to_string()
    .into_bytes()
}

async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn has_reset_cookie(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(RESET_COOKIE_NAME))
}

// ============================================================================
// MODULE: Checkout
// ============================================================================

mod checkout_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_checkout_returns_session_and_url() {
        let t = TestApp::new();
        let response = t
            .send(
                Request::post("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"documentId":"report_1","customerName":"Ada"}"#))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["sessionId"].as_str().unwrap().starts_with("cs_test_"));
        assert!(body["url"].as_str().unwrap().starts_with("https://"));
        assert_eq!(t.processor.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_checkout_without_document_id_is_400() {
        let t = TestApp::new();
        let response = t
            .send(
                Request::post("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "validation");
        assert_eq!(t.processor.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_checkout_with_malformed_json_is_400() {
        let t = TestApp::new();
        let response = t
            .send(
                Request::post("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_processor_outage_is_5xx() {
        let t = TestApp::new();
        t.processor.set_unavailable(true);
        let response = t
            .send(
                Request::post("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"documentId":"report_1"}"#))
                    .unwrap(),
            )
            .await;
        assert!(response.status().is_server_error());
    }

    #[tokio::test]
    async fn test_payment_status_reports_live_state() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;

        let response = t
            .get(&format!("/payment/status?session_id={session_id}"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["paymentStatus"], "unpaid");
        assert_eq!(body["metadata"]["documentId"], "report_1");

        let response = t.get("/payment/status").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = t.get("/payment/status?session_id=cs_missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// MODULE: Webhook
// ============================================================================

mod webhook_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_webhook_then_finalize_releases_document() {
        let t = TestApp::new();
        t.upload("report_1", "<h1>Report</h1>").await;
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);

        let body = completed_event("evt_1", &session_id, "report_1");
        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "received": true }));

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/documents/report_1");
        assert!(has_reset_cookie(&response));
    }

    #[tokio::test]
    async fn test_unusable_paid_event_is_acknowledged() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;

        // Paid session without a documentId
        let body = json!({
            "id": "evt_no_doc",
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id, "payment_status": "paid" } }
        })
        .to_string()
        .into_bytes();
        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "received": true }));

        // A second paid event naming another document for the same session
        let body = completed_event("evt_1", &session_id, "report_1");
        t.deliver(&body, &t.sign(&body)).await;
        let body = completed_event("evt_rebind", &session_id, "report_2");
        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "received": true }));

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_2"))
            .await;
        assert_eq!(location(&response), "/payment/cancelled");
        let response = t.get("/finalize?filename=report_2").await;
        assert_eq!(location(&response), "/payment/cancelled");
    }

    #[tokio::test]
    async fn test_redelivered_event_is_acknowledged_as_duplicate() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        let body = completed_event("evt_dup", &session_id, "report_1");

        let first = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(
            json_body(second).await,
            json!({ "received": true, "duplicate": true })
        );
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        let body = completed_event("evt_2", &session_id, "report_1");
        let signature = t.sign(&body);
        let tampered = completed_event("evt_2", &session_id, "report_2");

        let response = t.deliver(&tampered, &signature).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["kind"], "signature_invalid");

        // Nothing was confirmed, so a later finalize still has to pull
        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(location(&response), "/payment/cancelled");
    }

    #[tokio::test]
    async fn test_stale_signature_is_rejected() {
        let t = TestApp::new();
        let body = completed_event("evt_3", "cs_test_000001", "report_1");
        let stale = t
            .verifier
            .sign(&body, Utc::now().timestamp() - 3600)
            .unwrap();

        let response = t.deliver(&body, &stale).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let t = TestApp::new();
        let body = completed_event("evt_4", "cs_test_000001", "report_1");
        let response = t
            .send(
                Request::post("/webhook")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unrelated_event_type_is_acknowledged() {
        let t = TestApp::new();
        let body = json!({
            "id": "evt_other",
            "type": "invoice.paid",
            "created": Utc::now().timestamp(),
            "data": { "object": { "id": "in_1" } }
        })
        .to_string()
        .into_bytes();

        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ============================================================================
// MODULE: Finalize
// ============================================================================

mod finalize_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_finalize_pulls_status_when_webhook_is_late() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/documents/report_1");
        assert!(has_reset_cookie(&response));
        assert_eq!(t.processor.retrieve_calls(), 1);

        // Late webhook is a no-op
        let body = completed_event("evt_late", &session_id, "report_1");
        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_finalize_unpaid_goes_to_cancellation() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/payment/cancelled");
        assert!(!has_reset_cookie(&response));
    }

    #[tokio::test]
    async fn test_finalize_missing_parameters_goes_to_cancellation() {
        let t = TestApp::new();
        for uri in ["/finalize", "/finalize?session_id=cs_1", "/finalize?filename="] {
            let response = t.get(uri).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&response), "/payment/cancelled", "{uri}");
        }
        assert_eq!(t.processor.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_finalize_by_filename_after_webhook() {
        let t = TestApp::new();
        t.upload("letter_of_demand_123", "<h1>Demand</h1>").await;
        let session_id = t.checkout("letter_of_demand_123").await;
        t.processor.mark_paid(&session_id);

        let body = completed_event("evt_1", &session_id, "letter_of_demand_123");
        let response = t.deliver(&body, &t.sign(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = t.get("/finalize?filename=letter_of_demand_123").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/documents/letter_of_demand_123");
        assert!(has_reset_cookie(&response));
        assert_eq!(t.processor.retrieve_calls(), 0);

        let response = t.get("/documents/letter_of_demand_123").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_finalize_by_filename_without_payment_goes_to_cancellation() {
        let t = TestApp::new();
        let response = t.get("/finalize?filename=report_1").await;
        assert_eq!(location(&response), "/payment/cancelled");

        // Open but unpaid session
        t.checkout("report_1").await;
        let response = t.get("/finalize?filename=report_1").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/payment/cancelled");
        assert!(!has_reset_cookie(&response));
        assert_eq!(t.processor.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_finalize_with_malformed_query_goes_to_cancellation() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);

        let response = t
            .get(&format!(
                "/finalize?filename=report_1&filename=report_2&session_id={session_id}"
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/payment/cancelled");
        assert!(!has_reset_cookie(&response));
        assert_eq!(t.processor.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_finalize_with_other_document_is_refused() {
        let t = TestApp::new();
        t.upload("report_2", "<h1>Other</h1>").await;
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_2"))
            .await;
        assert_eq!(location(&response), "/payment/cancelled");

        let response = t.get("/documents/report_2").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_finalize_still_redirects_to_viewer() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);
        let uri = format!("/finalize?session_id={session_id}&filename=report_1");

        let first = t.get(&uri).await;
        let second = t.get(&uri).await;
        assert_eq!(location(&first), "/documents/report_1");
        assert_eq!(location(&second), "/documents/report_1");
    }

    #[tokio::test]
    async fn test_finalize_during_processor_outage_goes_to_cancellation() {
        let t = TestApp::new();
        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);
        t.processor.set_unavailable(true);

        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/payment/cancelled");

        // Recovery: the buyer retries after the outage
        t.processor.set_unavailable(false);
        let response = t
            .get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;
        assert_eq!(location(&response), "/documents/report_1");
    }

    #[tokio::test]
    async fn test_cancellation_page_escapes_filename() {
        let t = TestApp::new();
        let response = t
            .get("/payment/cancelled?filename=%3Cb%3Ex%3C%2Fb%3E")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = text_body(response).await;
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(!html.contains("<b>x</b>"));
    }
}

// ============================================================================
// MODULE: Documents
// ============================================================================

mod document_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_document_hidden_until_release() {
        let t = TestApp::new();
        let response = t.upload("report_1", "<h1>Quarterly</h1>").await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = t.get("/documents/report_1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let session_id = t.checkout("report_1").await;
        t.processor.mark_paid(&session_id);
        t.get(&format!("/finalize?session_id={session_id}&filename=report_1"))
            .await;

        let response = t.get("/documents/report_1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert_eq!(text_body(response).await, "<h1>Quarterly</h1>");
    }

    #[tokio::test]
    async fn test_released_but_missing_document_is_404_page() {
        let t = TestApp::new();
        let session_id = t.checkout("ghost").await;
        t.processor.mark_paid(&session_id);
        t.get(&format!("/finalize?session_id={session_id}&filename=ghost"))
            .await;

        let response = t.get("/documents/ghost").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(text_body(response).await.contains("ghost"));
    }

    #[tokio::test]
    async fn test_upload_requires_token() {
        let t = TestApp::new();
        let response = t
            .send(
                Request::put("/documents/report_1")
                    .body(Body::from("<p>x</p>"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = t
            .send(
                Request::put("/documents/report_1")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::from("<p>x</p>"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_413() {
        let t = TestApp::new();
        let limit = AppConfig::test_config().max_document_bytes;
        let oversized = "a".repeat(limit + 1);
        let response = t.upload("report_1", &oversized).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_upload_with_unsafe_id_is_rejected() {
        let t = TestApp::new();
        let response = t.upload("bad.id", "<p>x</p>").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_response_names_key() {
        let t = TestApp::new();
        let response = t.upload("report_1", "<p>x</p>").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            json_body(response).await,
            json!({ "documentId": "report_1", "key": "report_1.html", "size": 8 })
        );
    }
}

// ============================================================================
// MODULE: Operations
// ============================================================================

mod operations_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_health_and_ready() {
        let t = TestApp::new();
        let response = t.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = t.get("/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_security_headers_on_every_response() {
        let t = TestApp::new();
        let response = t.get("/health").await;
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let t = TestApp::new();
        t.checkout("report_1").await;

        let response = t.get("/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = text_body(response).await;
        assert!(text.contains("docgate_checkout_sessions_total"));
        assert!(text.contains("# TYPE"));
    }

    #[tokio::test]
    async fn test_status_reports_version() {
        let t = TestApp::new();
        let response = t.get("/status").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["version"], docgate::VERSION);
    }
}
