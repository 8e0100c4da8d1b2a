//! Integration tests for the HTTP surface.
//!
//! Requests are driven through the router in-process with `tower::ServiceExt`;
//! no sockets are opened. Multipart bodies are assembled by hand so the tests
//! also pin down the exact wire format clients must send.
//!
//! Run with:
//!   cargo test --test server

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use receipthub::server::router;
use receipthub::{DocumentExtractor, FieldInterpreter, ScanConfig, ScanError, TextSegment};
use std::path::Path;
use std::sync::Arc;
use tower::util::ServiceExt;

// ── Test fakes ───────────────────────────────────────────────────────────────

struct FixedExtractor {
    text: String,
}

#[async_trait]
impl DocumentExtractor for FixedExtractor {
    async fn extract(&self, _path: &Path) -> Result<Vec<TextSegment>, ScanError> {
        Ok(vec![TextSegment::new(self.text.clone())])
    }
}

struct FixedInterpreter {
    reply: String,
}

#[async_trait]
impl FieldInterpreter for FixedInterpreter {
    async fn complete(&self, _prompt: &str) -> Result<String, ScanError> {
        Ok(self.reply.clone())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

const GOOD_REPLY: &str = "```json\n{\"company_name\": \"Acme Corp\", \"address\": \"123 Main St\", \"subtotal\": \"100.00\", \"total_amount\": \"110.00\"}\n```";

const BOUNDARY: &str = "receipthub-test-boundary";

/// A single multipart part: field name, optional (filename, content type),
/// and the raw payload.
struct Part<'a> {
    name: &'a str,
    file: Option<(&'a str, &'a str)>,
    bytes: &'a [u8],
}

fn text_part<'a>(name: &'a str, value: &'a str) -> Part<'a> {
    Part {
        name,
        file: None,
        bytes: value.as_bytes(),
    }
}

fn file_part<'a>(name: &'a str, filename: &'a str, content_type: &'a str, bytes: &'a [u8]) -> Part<'a> {
    Part {
        name,
        file: Some((filename, content_type)),
        bytes,
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part.file {
            Some((filename, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                    part.name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(part.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload-bill")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn test_config(dir: &Path, reply: &str) -> ScanConfig {
    ScanConfig::builder()
        .table_path(dir.join("bills.csv"))
        .archive_dir(dir.join("archive"))
        .extractor(Arc::new(FixedExtractor {
            text: "ACME CORP receipt text".to_string(),
        }))
        .interpreter(Arc::new(FixedInterpreter {
            reply: reply.to_string(),
        }))
        .build()
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn upload_returns_stored_row() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[
            file_part("bill", "march.pdf", "application/pdf", b"%PDF-1.4 bill"),
            text_part("category", "Utilities"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Bill details successfully extracted and stored.");
    assert_eq!(body["bill_details"]["company_name"], "Acme Corp");
    assert_eq!(body["bill_details"]["total_amount"], "110.00");
    assert_eq!(body["bill_details"]["category"], "Utilities");
    // The date key keeps its historical capitalised spelling.
    assert!(
        body["bill_details"]["Scanned_on"].is_string(),
        "got: {body}"
    );
    assert_eq!(body["raw_response"], GOOD_REPLY);

    // The row really was persisted, not just echoed.
    let table = std::fs::read_to_string(dir.path().join("bills.csv")).unwrap();
    assert!(table.contains("Acme Corp"), "got: {table}");
}

#[tokio::test]
async fn missing_bill_part_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[text_part("category", "Utilities")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No bill file provided");
}

#[tokio::test]
async fn missing_category_part_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[file_part(
            "bill",
            "march.pdf",
            "application/pdf",
            b"%PDF-1.4 bill",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No category selected");
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[
            file_part("bill", "notes.txt", "text/plain", b"not a bill"),
            text_part("category", "Utilities"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(
        error.starts_with("Unsupported file type 'text/plain'"),
        "got: {error}"
    );
}

#[tokio::test]
async fn model_failure_maps_to_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), "Sorry, no structured data found."));

    let response = app
        .oneshot(upload_request(&[
            file_part("bill", "march.pdf", "application/pdf", b"%PDF-1.4 bill"),
            text_part("category", "Utilities"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(
        error.starts_with("Failed to extract JSON from the model reply."),
        "got: {error}"
    );
}

#[tokio::test]
async fn unknown_form_fields_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[
            text_part("note", "please file this quickly"),
            file_part("bill", "march.pdf", "application/pdf", b"%PDF-1.4 bill"),
            text_part("category", "Travel"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["bill_details"]["category"], "Travel");
}

#[tokio::test]
async fn empty_bill_part_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_config(dir.path(), GOOD_REPLY));

    let response = app
        .oneshot(upload_request(&[
            file_part("bill", "march.pdf", "application/pdf", b""),
            text_part("category", "Utilities"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No bill file provided");
}
