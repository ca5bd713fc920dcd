//! HTTP endpoint tests using axum-test
//!
//! Each test gets its own in-memory database and temporary blob directory.
//! Email is disabled, so invites and completion notices only log.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Parser;
use lopdf::{dictionary, Document, Object};
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use crate::config::Config;
use crate::state::AppState;
use crate::store;

const OWNER: &str = "owner-1";
const BASE_URL: &str = "http://localhost:3001";

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    _data_dir: TempDir,
}

async fn harness_with(extra: &[&str]) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let dir = data_dir.path().to_str().unwrap().to_string();
    let mut args = vec![
        "docsign-api",
        "--data-dir",
        dir.as_str(),
        "--public-base-url",
        BASE_URL,
        "--frontend-url",
        "https://sign.test",
        "--resend-api-key",
        "",
    ];
    args.extend_from_slice(extra);
    let config = Config::parse_from(args);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let state = Arc::new(AppState::with_pool(pool, config).await.unwrap());
    let server = TestServer::new(crate::app(state.clone())).unwrap();
    Harness {
        server,
        state,
        _data_dir: data_dir,
    }
}

async fn harness() -> Harness {
    harness_with(&[]).await
}

fn as_owner(request: TestRequest, owner: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-owner-id"),
        HeaderValue::from_str(owner).unwrap(),
    )
}

fn blank_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            Object::Reference(page_id)
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn signature_data_url() -> String {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 4, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        let data: Vec<u8> = [0u8, 0, 0, 255].repeat(8);
        writer.write_image_data(&data).unwrap();
    }
    format!("data:image/png;base64,{}", BASE64.encode(out))
}

/// Path part of a URL handed out by the blob store
fn blob_path(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap()
}

async fn create_envelope(server: &TestServer, title: &str, mode: &str) -> String {
    let response = as_owner(server.post("/api/envelopes"), OWNER)
        .json(&json!({
            "title": title,
            "owner_name": "Olive Owner",
            "owner_email": " Olive@Example.com ",
            "signing_mode": mode,
        }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

async fn upload(server: &TestServer, id: &str, pages: u32) -> Value {
    let response = as_owner(server.post(&format!("/api/envelopes/{}/upload", id)), OWNER)
        .json(&json!({ "pdf_base64": BASE64.encode(blank_pdf(pages)) }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

/// Two recipients; returns `[(id, token)]` in signing order
async fn add_recipients(server: &TestServer, id: &str) -> Vec<(String, String)> {
    let response = as_owner(
        server.put(&format!("/api/envelopes/{}/recipients", id)),
        OWNER,
    )
    .json(&json!([
        { "name": "Ann", "email": "ANN@example.com ", "order": 1 },
        { "name": "Ben", "email": "ben@example.com", "order": 2 },
    ]))
    .await;
    response.assert_status_ok();
    response
        .json::<Vec<Value>>()
        .iter()
        .map(|r| {
            (
                r["id"].as_str().unwrap().to_string(),
                r["token"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

/// A signature box for the first recipient, a date box for the second.
/// Returns the field ids in the same order.
async fn add_fields(server: &TestServer, id: &str, recipients: &[(String, String)]) -> Vec<String> {
    let response = as_owner(server.put(&format!("/api/envelopes/{}/fields", id)), OWNER)
        .json(&json!([
            {
                "recipient_id": recipients[0].0,
                "page": 1, "x": 0.1, "y": 0.7, "width": 0.3, "height": 0.08,
                "type": "signature",
            },
            {
                "recipient_id": recipients[1].0,
                "page": 1, "x": 0.5, "y": 0.1, "width": 0.2, "height": 0.05,
                "type": "date", "required": false,
            },
        ]))
        .await;
    response.assert_status_ok();
    response
        .json::<Vec<Value>>()
        .iter()
        .map(|f| f["id"].as_str().unwrap().to_string())
        .collect()
}

async fn send(server: &TestServer, id: &str) -> Value {
    let response = as_owner(server.post(&format!("/api/envelopes/{}/send", id)), OWNER).await;
    response.assert_status_ok();
    response.json::<Value>()
}

async fn submit(server: &TestServer, token: &str, field_id: &str, value: &str) -> axum_test::TestResponse {
    server
        .post(&format!("/api/sign/{}", token))
        .json(&json!({ "values": [{ "field_id": field_id, "value": value }] }))
        .await
}

async fn detail(server: &TestServer, id: &str) -> Value {
    let response = as_owner(server.get(&format!("/api/envelopes/{}", id)), OWNER).await;
    response.assert_status_ok();
    response.json::<Value>()
}

/// Envelope with a one-page PDF, two recipients and their fields, already sent
async fn sent_envelope(server: &TestServer, mode: &str) -> (String, Vec<(String, String)>, Vec<String>) {
    let id = create_envelope(server, "Lease", mode).await;
    upload(server, &id, 1).await;
    let recipients = add_recipients(server, &id).await;
    let fields = add_fields(server, &id, &recipients).await;
    send(server, &id).await;
    (id, recipients, fields)
}

#[tokio::test]
async fn test_health_returns_ok() {
    let h = harness().await;
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_owner_endpoints_require_owner_header() {
    let h = harness().await;
    let response = h.server.get("/api/envelopes").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["status"], 401);
}

#[tokio::test]
async fn test_create_get_and_list_envelopes() {
    let h = harness().await;
    let first = create_envelope(&h.server, "First", "parallel").await;
    let second = create_envelope(&h.server, "Second", "sequential").await;

    let body = detail(&h.server, &second).await;
    assert_eq!(body["envelope"]["status"], "draft");
    assert_eq!(body["envelope"]["signing_mode"], "sequential");
    assert_eq!(body["envelope"]["owner_email"], "olive@example.com");
    assert_eq!(body["envelope"]["page_count"], 1);
    assert_eq!(body["recipients"], json!([]));

    let listed = as_owner(h.server.get("/api/envelopes"), OWNER)
        .await
        .json::<Vec<Value>>();
    let ids: Vec<&str> = listed.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()) && ids.contains(&second.as_str()));

    let other = as_owner(h.server.get("/api/envelopes"), "owner-2")
        .await
        .json::<Vec<Value>>();
    assert!(other.is_empty());
    as_owner(h.server.get(&format!("/api/envelopes/{}", first)), "owner-2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_requires_title() {
    let h = harness().await;
    as_owner(h.server.post("/api/envelopes"), OWNER)
        .json(&json!({ "title": "   " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_ignores_blank_title_and_bad_count() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Original", "parallel").await;

    let body = as_owner(h.server.patch(&format!("/api/envelopes/{}", id)), OWNER)
        .json(&json!({ "title": "  ", "page_count": 0 }))
        .await
        .json::<Value>();
    assert_eq!(body["title"], "Original");
    assert_eq!(body["page_count"], 1);

    let body = as_owner(h.server.patch(&format!("/api/envelopes/{}", id)), OWNER)
        .json(&json!({ "title": "Renamed", "page_count": 4 }))
        .await
        .json::<Value>();
    assert_eq!(body["title"], "Renamed");
    assert_eq!(body["page_count"], 4);
}

#[tokio::test]
async fn test_upload_uses_decoded_page_count() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;
    let pdf = blank_pdf(2);

    let response = as_owner(h.server.post(&format!("/api/envelopes/{}/upload", id)), OWNER)
        .json(&json!({ "pdf_base64": BASE64.encode(&pdf), "page_count": 5 }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["page_count"], 2);
    assert_eq!(body["pdf_sha256"].as_str().unwrap().len(), 64);
    let key = body["pdf_key"].as_str().unwrap();
    assert!(key.starts_with(&format!("envelopes/{}/", id)));

    let envelope = detail(&h.server, &id).await;
    assert_eq!(envelope["envelope"]["page_count"], 2);

    let served = h.server.get(blob_path(body["pdf_url"].as_str().unwrap())).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().to_vec(), pdf);
}

#[tokio::test]
async fn test_upload_rejects_non_pdf_and_oversized() {
    let h = harness_with(&["--max-upload-bytes", "64"]).await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;

    as_owner(h.server.post(&format!("/api/envelopes/{}/upload", id)), OWNER)
        .json(&json!({ "pdf_base64": BASE64.encode(b"not a pdf") }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    as_owner(h.server.post(&format!("/api/envelopes/{}/upload", id)), OWNER)
        .json(&json!({ "pdf_base64": "%%%" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    as_owner(h.server.post(&format!("/api/envelopes/{}/upload", id)), OWNER)
        .json(&json!({ "pdf_base64": BASE64.encode(blank_pdf(1)) }))
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_fields_must_reference_known_recipients() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;
    add_recipients(&h.server, &id).await;

    as_owner(h.server.put(&format!("/api/envelopes/{}/fields", id)), OWNER)
        .json(&json!([{
            "recipient_id": "someone-else",
            "page": 1, "x": 0.1, "y": 0.1, "width": 0.1, "height": 0.1,
            "type": "text",
        }]))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recipients_are_normalized_with_fresh_tokens() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;
    let first = add_recipients(&h.server, &id).await;
    let second = add_recipients(&h.server, &id).await;
    assert_ne!(first[0].1, second[0].1);

    let body = detail(&h.server, &id).await;
    let emails: Vec<&str> = body["recipients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, vec!["ann@example.com", "ben@example.com"]);
}

#[tokio::test]
async fn test_send_preconditions() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;

    as_owner(h.server.post(&format!("/api/envelopes/{}/send", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    upload(&h.server, &id, 1).await;
    as_owner(h.server.post(&format!("/api/envelopes/{}/send", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    as_owner(h.server.get(&format!("/api/envelopes/{}/links", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signing_view_lists_only_own_fields() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    let body = h
        .server
        .get(&format!("/api/sign/{}", recipients[1].1))
        .await
        .json::<Value>();
    assert_eq!(body["envelope"]["id"], id.as_str());
    assert_eq!(body["recipient"]["name"], "Ben");
    let ids: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![fields[1].as_str()]);

    h.server
        .get("/api/sign/no-such-token")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signing_view_rejects_draft() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Lease", "parallel").await;
    let recipients = add_recipients(&h.server, &id).await;
    h.server
        .get(&format!("/api/sign/{}", recipients[0].1))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_parallel_flow_produces_signed_pdf() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    let links = as_owner(h.server.get(&format!("/api/envelopes/{}/links", id)), OWNER)
        .await
        .json::<Value>();
    assert_eq!(
        links["links"][0]["signing_url"],
        format!("https://sign.test/sign/{}", recipients[0].1)
    );

    let response = submit(&h.server, &recipients[1].1, &fields[1], "2024-01-01").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["all_signed"], false);

    as_owner(h.server.get(&format!("/api/envelopes/{}/download", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = submit(&h.server, &recipients[0].1, &fields[0], &signature_data_url()).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["all_signed"], true);

    let body = detail(&h.server, &id).await;
    assert_eq!(body["envelope"]["status"], "completed");
    assert!(body["recipients"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] == "signed" && r["signed_at"].is_string()));
    let signed_url = body["envelope"]["signed_pdf_url"].as_str().unwrap().to_string();
    assert!(signed_url.contains(&format!("/blobs/envelopes/{}/signed-", id)));

    let download = as_owner(h.server.get(&format!("/api/envelopes/{}/download", id)), OWNER)
        .await
        .json::<Value>();
    assert_eq!(download["signed_pdf_url"], signed_url.as_str());

    let served = h.server.get(blob_path(&signed_url)).await;
    served.assert_status_ok();
    let bytes = served.as_bytes().to_vec();
    assert_eq!(docsign_core::page_count(&bytes).unwrap(), 1);
    assert_ne!(bytes, blank_pdf(1));
}

#[tokio::test]
async fn test_already_signed_is_rejected() {
    let h = harness().await;
    let (_, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    submit(&h.server, &recipients[1].1, &fields[1], "2024-01-01")
        .await
        .assert_status_ok();
    submit(&h.server, &recipients[1].1, &fields[1], "2024-02-02")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

/// Stored value of one field, as the owner sees it
async fn field_value(server: &TestServer, id: &str, field_id: &str) -> Value {
    detail(server, id).await["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["id"] == field_id)
        .unwrap()["value"]
        .clone()
}

#[tokio::test]
async fn test_second_signing_leaves_first_values() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    submit(&h.server, &recipients[1].1, &fields[1], "FIRST")
        .await
        .assert_status_ok();

    let values = vec![(fields[1].clone(), Some("SECOND".to_string()))];
    let outcome = store::sign_with_values(&h.state.db, &id, &recipients[1].0, &values, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, None);
    assert_eq!(field_value(&h.server, &id, &fields[1]).await, "FIRST");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submits_keep_winner_values() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    let (first, second) = tokio::join!(
        submit(&h.server, &recipients[1].1, &fields[1], "FIRST"),
        submit(&h.server, &recipients[1].1, &fields[1], "SECOND"),
    );

    let mut statuses = vec![first.status_code(), second.status_code()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::BAD_REQUEST]);

    let winner = if first.status_code() == StatusCode::OK {
        "FIRST"
    } else {
        "SECOND"
    };
    assert_eq!(field_value(&h.server, &id, &fields[1]).await, winner);
}

#[tokio::test]
async fn test_sequential_order_is_enforced() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "sequential").await;

    submit(&h.server, &recipients[1].1, &fields[1], "2024-01-01")
        .await
        .assert_status(StatusCode::CONFLICT);

    let response = submit(&h.server, &recipients[0].1, &fields[0], &signature_data_url()).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["all_signed"], false);

    let response = submit(&h.server, &recipients[1].1, &fields[1], "2024-01-01").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["all_signed"], true);

    let body = detail(&h.server, &id).await;
    assert_eq!(body["envelope"]["status"], "completed");
}

#[tokio::test]
async fn test_submit_cannot_fill_other_recipients_fields() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;

    submit(&h.server, &recipients[0].1, &fields[1], "1999-12-31")
        .await
        .assert_status_ok();

    let body = detail(&h.server, &id).await;
    let date = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["id"] == fields[1].as_str())
        .unwrap()
        .clone();
    assert!(date["value"].is_null());
}

#[tokio::test]
async fn test_resend_reports_recipient_count() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;
    submit(&h.server, &recipients[0].1, &fields[0], &signature_data_url())
        .await
        .assert_status_ok();

    let body = send(&h.server, &id).await;
    assert_eq!(body["status"], "sent");
    assert_eq!(body["recipient_count"], 2);
    assert!(body.get("email_errors").is_none());
}

#[tokio::test]
async fn test_completed_envelope_cannot_be_sent_or_deleted() {
    let h = harness().await;
    let (id, recipients, fields) = sent_envelope(&h.server, "parallel").await;
    submit(&h.server, &recipients[0].1, &fields[0], &signature_data_url())
        .await
        .assert_status_ok();
    submit(&h.server, &recipients[1].1, &fields[1], "2024-01-01")
        .await
        .assert_status_ok();

    as_owner(h.server.post(&format!("/api/envelopes/{}/send", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    as_owner(h.server.delete(&format!("/api/envelopes/{}", id)), OWNER)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_draft() {
    let h = harness().await;
    let id = create_envelope(&h.server, "Scratch", "parallel").await;
    add_recipients(&h.server, &id).await;

    as_owner(h.server.delete(&format!("/api/envelopes/{}", id)), OWNER)
        .await
        .assert_status_ok();
    as_owner(h.server.get(&format!("/api/envelopes/{}", id)), OWNER)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
