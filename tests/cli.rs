//! CLI test cases.
//!
//! Tests which need Poppler or Tesseract installed are marked `#[ignore]`.
//! Run them with `cargo test -- --ignored`.

use std::{fs, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Batch files produced by a small-batch run.
static BATCH_DIR: &str = "tests/fixtures/batches";

/// A two page PDF with a text layer.
static TWO_PAGE_PDF: &str = "tests/fixtures/two_pages.pdf";

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("scan-batch-ocr").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_combine_batch_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("combined.txt");
    cmd()
        .arg("combine")
        .arg(BATCH_DIR)
        .arg("--prefix")
        .arg("small_batch")
        .arg("--source")
        .arg("Request.pdf (5 pages)")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let combined = fs::read_to_string(&out).unwrap();
    assert!(combined.starts_with("PDF TEXT EXTRACTION RESULTS\n"));
    assert!(combined.contains("Source: Request.pdf (5 pages)\n"));
    assert!(combined.contains("Total batches: 2\n"));
    assert!(combined.contains("Total pages processed: 5\n"));
    assert!(!combined.contains("Not a batch file"));
    let page_1 = combined.find("--- Page 1 ---").unwrap();
    let page_4 = combined.find("--- Page 4 ---").unwrap();
    assert!(page_1 < page_4);
}

#[test]
fn test_combine_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .arg("combine")
        .arg("no_such_dir")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no_such_dir"));
}

#[test]
fn test_analyze_batch_directory_to_stdout() {
    cmd()
        .arg("analyze")
        .arg(BATCH_DIR)
        .arg("-o")
        .arg("-")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_pages\": 5"))
        .stdout(predicate::str::contains("Mary Jones"))
        .stdout(predicate::str::contains("\"page_type\": \"yearbook\""));
}

#[test]
fn test_analyze_writes_report_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("content_analysis.json");
    let index = dir.path().join("categorized_content.json");
    cmd()
        .arg("analyze")
        .arg(BATCH_DIR)
        .arg("-o")
        .arg(&report)
        .arg("--index")
        .arg(&index)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["total_pages"], 5);
    assert_eq!(report["substantial_pages"], 2);

    let index: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&index).unwrap()).unwrap();
    assert_eq!(index["contents_pages"][0][0], 1);
    assert_eq!(index["empty_pages"].as_array().unwrap().len(), 2);
    assert_eq!(index["yearbook_pages"].as_array().unwrap().len(), 2);
}

#[test]
fn test_analyze_with_custom_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("analysis.toml");
    fs::write(
        &config,
        r#"
substantial_threshold = 0
sample_pages = 1
preview_chars = 8
fallback_page_type = "misc"

[names]
patterns = ['\bMary\b']
top = 5
min_count = 1

[[page_types]]
name = "letter"
keywords = ["dear"]

[[keyword_categories]]
name = "Places"
keywords = ["Brooklyn"]
"#,
    )
    .unwrap();
    cmd()
        .arg("analyze")
        .arg(BATCH_DIR)
        .arg("--config")
        .arg(&config)
        .arg("-o")
        .arg("-")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"CONTENTS\""))
        .stdout(predicate::str::contains("\"page_type\": \"letter\""))
        .stdout(predicate::str::contains("\"page_type\": \"misc\""));
}

#[test]
fn test_schema_analysis_config() {
    cmd()
        .arg("schema")
        .arg("AnalysisConfig")
        .assert()
        .success()
        .stdout(predicate::str::contains("substantial_threshold"));
}

#[test]
fn test_ocr_fails_early_without_tesseract() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("ocr")
        .arg(TWO_PAGE_PDF)
        .arg("--tesseract-cmd")
        .arg("/nonexistent/tesseract")
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Tesseract not found"));
    assert!(!dir.path().join("out").exists());
}

#[test]
#[ignore = "Requires poppler-utils to be installed"]
fn test_info() {
    cmd()
        .arg("info")
        .arg(TWO_PAGE_PDF)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pages\": 2"));
}

#[test]
#[ignore = "Requires poppler-utils to be installed"]
fn test_rasterize() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("rasterize")
        .arg(TWO_PAGE_PDF)
        .arg("--out-dir")
        .arg(dir.path())
        .arg("--dpi")
        .arg("72")
        .assert()
        .success();
    assert!(dir.path().join("page_001.png").exists());
    assert!(dir.path().join("page_002.png").exists());
}

#[test]
#[ignore = "Requires poppler-utils to be installed"]
fn test_ocr_pdftotext_batches_and_combine() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("batches");
    let combined = dir.path().join("combined.txt");
    cmd()
        .arg("ocr")
        .arg(TWO_PAGE_PDF)
        .arg("--engine")
        .arg("pdftotext")
        .arg("--batch-size")
        .arg("1")
        .arg("--pause-secs")
        .arg("0")
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--combine")
        .arg("--combined-path")
        .arg(&combined)
        .assert()
        .success();

    let first = fs::read_to_string(out_dir.join("batch_001_pages_001-001.txt")).unwrap();
    assert!(first.starts_with("\n--- Page 1 ---\n"));
    assert!(first.contains("Hello from page one"));
    assert!(out_dir.join("batch_002_pages_002-002.txt").exists());
    let combined = fs::read_to_string(&combined).unwrap();
    assert!(combined.contains("Source: two_pages.pdf (2 pages)\n"));
    assert!(combined.contains("Total pages processed: 2\n"));
}

#[test]
#[ignore = "Requires poppler-utils and tesseract to be installed"]
fn test_ocr_tesseract_small_batches() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .arg("ocr")
        .arg(fs::canonicalize(TWO_PAGE_PDF).unwrap())
        .arg("--small-batches")
        .arg("--pause-secs")
        .arg("0")
        .assert()
        .success();
    let batch = dir
        .path()
        .join("small_batch_results/small_batch_001_pages_001-002.txt");
    let text = fs::read_to_string(batch).unwrap();
    assert!(text.contains("--- Page 2 ---"));
    assert!(text.contains(&"-".repeat(30)));
}
