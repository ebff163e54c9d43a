use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn repo_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("expected crates/<name> layout")
        .to_path_buf()
}

fn fixture(name: &str) -> PathBuf {
    let path = repo_root().join("fixtures").join("svg").join(name);
    assert!(path.exists(), "fixture missing: {}", path.display());
    path
}

#[test]
fn cli_normalizes_to_stdout() {
    let fixture = fixture("variable-driven.svg");
    let exe = assert_cmd::cargo_bin!("studio-cli");
    let output = Command::new(exe)
        .args(["normalize", "--font", "Inter, sans-serif"])
        .arg(&fixture)
        .output()
        .expect("run studio-cli");
    assert!(output.status.success(), "{output:?}");

    let svg = String::from_utf8(output.stdout).expect("utf-8");
    assert!(!svg.contains("var("), "{svg}");
    assert!(!svg.contains("class="), "{svg}");
    assert!(svg.contains(r#"font-family="Inter, sans-serif""#), "{svg}");
}

#[test]
fn cli_normalizes_stdin_with_a_theme() {
    let exe = assert_cmd::cargo_bin!("studio-cli");
    let assert = assert_cmd::Command::new(exe)
        .args(["normalize", "--theme", "github-dark", "-"])
        .write_stdin(r#"<svg xmlns="http://www.w3.org/2000/svg"><g/></svg>"#)
        .assert()
        .success();
    let svg = String::from_utf8(assert.get_output().stdout.clone()).expect("utf-8");
    assert!(svg.contains(r#"fill="rgb(13, 17, 23)""#), "{svg}");
}

#[test]
fn cli_exports_png_at_the_requested_quality() {
    let fixture = fixture("variable-driven.svg");
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out.png");

    let exe = assert_cmd::cargo_bin!("studio-cli");
    Command::new(exe)
        .args([
            "export",
            "--format",
            "png",
            "--quality",
            "10",
            "--out",
            out.to_string_lossy().as_ref(),
            fixture.to_string_lossy().as_ref(),
        ])
        .assert()
        .success();

    let bytes = fs::read(&out).expect("read png");
    assert!(
        bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        "output is not a PNG"
    );
    let reader = png::Decoder::new(bytes.as_slice())
        .read_info()
        .expect("png header");
    assert_eq!((reader.info().width, reader.info().height), (220, 120));
}

#[test]
fn cli_exports_pdf_next_to_the_input() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tmp_fixture = tmp.path().join("chart.svg");
    fs::copy(fixture("rich-text.svg"), &tmp_fixture).expect("copy fixture");
    let expected_out = tmp_fixture.with_extension("pdf");

    let exe = assert_cmd::cargo_bin!("studio-cli");
    Command::new(exe)
        .args([
            "export",
            "--format",
            "pdf",
            "--engine",
            "mermaid-js",
            tmp_fixture.to_string_lossy().as_ref(),
        ])
        .assert()
        .success();

    let bytes = fs::read(&expected_out).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF-"), "output is not a PDF");
}

#[test]
fn cli_export_reads_defaults_from_settings() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let settings = tmp.path().join("settings.json");
    fs::write(&settings, r#"{"exportDefaultFormat":"svg","chartFont":"Georgia, serif"}"#)
        .expect("write settings");
    let out = tmp.path().join("out.svg");

    let exe = assert_cmd::cargo_bin!("studio-cli");
    Command::new(exe)
        .args([
            "export",
            "--settings",
            settings.to_string_lossy().as_ref(),
            "--out",
            out.to_string_lossy().as_ref(),
            fixture("variable-driven.svg").to_string_lossy().as_ref(),
        ])
        .assert()
        .success();

    let svg = fs::read_to_string(&out).expect("read svg");
    assert!(svg.contains(r#"font-family="Georgia, serif""#), "{svg}");
}

#[test]
fn cli_lists_builtin_themes_as_json() {
    let exe = assert_cmd::cargo_bin!("studio-cli");
    let output = Command::new(exe)
        .args(["themes", "--json"])
        .output()
        .expect("run studio-cli");
    assert!(output.status.success());

    let themes: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(themes["github-dark"]["bg"], "#0d1117");
    assert!(themes["nord"]["fg"].is_string());
}

#[test]
fn cli_rejects_unknown_flags_with_usage() {
    let exe = assert_cmd::cargo_bin!("studio-cli");
    Command::new(exe)
        .args(["export", "--format", "gif"])
        .assert()
        .code(2);
}

#[test]
fn cli_reports_unknown_themes() {
    let exe = assert_cmd::cargo_bin!("studio-cli");
    assert_cmd::Command::new(exe)
        .args(["normalize", "--theme", "no-such-theme", "-"])
        .write_stdin(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#)
        .assert()
        .code(1);
}
