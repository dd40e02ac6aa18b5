use std::path::PathBuf;
use std::process::Command;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../nomnom-client/tests/fixtures/short_run.json")
}

#[test]
fn terminal_headless_smoke() {
    let bin = env!("CARGO_BIN_EXE_nomnom-app");
    let status = Command::new(bin)
        .arg("--file")
        .arg(fixture_path())
        .env("NOMNOM_RENDERER", "terminal")
        .env("NOMNOM_TERMINAL_HEADLESS", "1")
        .env("TERM", "xterm-256color")
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run nomnom-app binary");
    assert!(status.success(), "terminal headless run failed");
}

#[test]
fn log_renderer_smoke() {
    let bin = env!("CARGO_BIN_EXE_nomnom-app");
    let status = Command::new(bin)
        .args(["--renderer", "log", "--tick-ms", "1", "--file"])
        .arg(fixture_path())
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run nomnom-app binary");
    assert!(status.success(), "log run failed");
}

#[test]
fn missing_record_fails_with_context() {
    let bin = env!("CARGO_BIN_EXE_nomnom-app");
    let missing = std::env::temp_dir().join(format!("nomnom-absent-{}.json", std::process::id()));
    let output = Command::new(bin)
        .args(["--renderer", "log", "--file"])
        .arg(&missing)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run nomnom-app binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to load simulation record"),
        "unexpected stderr: {stderr}"
    );
}
