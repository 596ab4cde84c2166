//! HTTP API tests against a server bound to an ephemeral port.

use std::sync::Arc;

use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;

use pdf_qa::config::Config;
use pdf_qa::embedding::DisabledProvider;
use pdf_qa::extract::BundleExtractor;
use pdf_qa::gateway::Gateway;
use pdf_qa::server::router;
use pdf_qa::session::Session;

async fn spawn(session: Arc<Session>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(session)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn offline_session(tmp: &TempDir) -> Arc<Session> {
    let mut cfg = Config::default();
    cfg.workspace.dir = tmp.path().join("ws");
    Arc::new(Session::new(
        cfg,
        Arc::new(Gateway::offline()),
        Arc::new(DisabledProvider),
    ))
}

async fn ingest_bundle(tmp: &TempDir, session: &Session) {
    let bundle = tmp.path().join("bundle");
    std::fs::create_dir_all(bundle.join("images")).unwrap();
    std::fs::write(
        bundle.join("content.md"),
        "# Survey\n\n## Background\n\nConvolutional networks dominate vision tasks.\n",
    )
    .unwrap();
    std::fs::write(
        bundle.join("img_descriptions.md"),
        "<PAGE_1_IMAGE_1>\nTimeline of network architectures.\n</PAGE_1_IMAGE_1>\n",
    )
    .unwrap();
    let mut img = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));
    img.put_pixel(3, 3, Rgb([200, 0, 0]));
    img.save(bundle.join("images/page_1_img_1_1.png")).unwrap();

    let pdf = tmp.path().join("survey.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 survey").unwrap();
    session
        .ingest(&pdf, &BundleExtractor::new(bundle))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_and_no_document() {
    let tmp = TempDir::new().unwrap();
    let base = spawn(offline_session(&tmp)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["llm"], "offline");
    assert!(health["document"].is_null());

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "what?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_document");
}

#[tokio::test]
async fn test_empty_question_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let base = spawn(offline_session(&tmp)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_images_and_figure_answer() {
    let tmp = TempDir::new().unwrap();
    let session = offline_session(&tmp);
    ingest_bundle(&tmp, &session).await;
    let base = spawn(session).await;
    let client = reqwest::Client::new();

    let list: Value = client
        .get(format!("{}/images", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["images"].as_array().unwrap().len(), 1);
    assert_eq!(list["images"][0]["ordinal"], 1);

    let resp = client
        .get(format!("{}/images/1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    let bytes = resp.bytes().await.unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));

    let resp = client
        .get(format!("{}/images/7", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let answer: Value = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "第1张图展示了什么？" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["is_image_answer"], true);
    assert_eq!(answer["answer"], "Timeline of network architectures.");
}

#[tokio::test]
async fn test_upload_non_pdf_is_unprocessable() {
    let tmp = TempDir::new().unwrap();
    let base = spawn(offline_session(&tmp)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/documents?name=notes.pdf", base))
        .body("plain text, not a pdf")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_content");
}
