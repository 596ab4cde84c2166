use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

fn pdfqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfqa"))
}

/// Config pointing at a temp workspace, plus a ready-made extraction bundle.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let bundle = root.join("bundle");
    fs::create_dir_all(bundle.join("images")).unwrap();
    fs::write(
        bundle.join("content.md"),
        "# Graph Networks\n\n## Method\n\nMessage passing over molecular graphs.\n\n\
         ## Results\n\nThe model improves accuracy on the QM9 benchmark.\n",
    )
    .unwrap();
    fs::write(
        bundle.join("img_descriptions.md"),
        "<PAGE_1_IMAGE_1>\nDiagram of the message passing layer.\n</PAGE_1_IMAGE_1>\n",
    )
    .unwrap();
    let mut img = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
    img.put_pixel(60, 60, Rgb([0, 0, 0]));
    img.save(bundle.join("images/page_1_img_1_1.png")).unwrap();

    fs::write(root.join("paper.pdf"), b"%PDF-1.4 placeholder").unwrap();

    let config_content = format!(
        r#"[workspace]
dir = "{}/ws"

[retrieval]
top_k = 3

[server]
bind = "127.0.0.1:7342"
"#,
        root.display()
    );
    let config_path = root.join("pdfqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdfqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdfqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingest(tmp: &TempDir, config_path: &Path) {
    let pdf = tmp.path().join("paper.pdf");
    let bundle = tmp.path().join("bundle");
    let (stdout, stderr, success) = run_pdfqa(
        config_path,
        &["ingest", pdf.to_str().unwrap(), "--bundle", bundle.to_str().unwrap()],
    );
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("Ingested paper.pdf"));
}

#[test]
fn test_help() {
    let output = Command::new(pdfqa_binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["ingest", "ask", "summary", "chunks", "images", "serve"] {
        assert!(stdout.contains(cmd), "help is missing {}", cmd);
    }
}

#[test]
fn test_ask_without_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_pdfqa(&config_path, &["ask", "what is this?"]);
    assert!(!success);
    assert!(stderr.contains("no document loaded"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 0\n").unwrap();
    let (_, stderr, success) = run_pdfqa(&bad, &["images"]);
    assert!(!success);
    assert!(stderr.contains("chunk_size"));
}

#[test]
fn test_ingest_then_list() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_pdfqa(&config_path, &["images"]);
    assert!(success);
    assert!(stdout.contains("images/page_1_img_1_1.png"));
    assert!(stdout.contains("yes"));

    let (stdout, _, success) = run_pdfqa(&config_path, &["chunks"]);
    assert!(success);
    assert!(stdout.contains("paper.pdf"));
    assert!(stdout.contains("Graph Networks"));
}

#[test]
fn test_ask_figure_offline_json() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) =
        run_pdfqa(&config_path, &["ask", "第1页的第1张图是什么？", "--json"]);
    assert!(success, "ask failed: {}", stderr);
    let answer: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(answer["is_image_answer"], true);
    assert_eq!(answer["answer"], "Diagram of the message passing layer.");
    assert_eq!(answer["evidence"]["kind"], "image");
    assert_eq!(answer["route"]["page"], 1);
}

#[test]
fn test_ask_text_offline_prints_evidence() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_pdfqa(
        &config_path,
        &["ask", "Which benchmark shows improved accuracy?", "--highlight"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("api调用失败"));
    assert!(stdout.contains("--- Evidence ---"));
    assert!(stdout.contains("QM9"));
}

#[test]
fn test_summary_offline_stub() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_pdfqa(&config_path, &["summary"]);
    assert!(success);
    assert!(stdout.contains("离线总结"));
}
