//! E2E Integration tests for cra
//!
//! Every test drives the real binary against an in-process fake review
//! backend bound to an ephemeral port.
//!
//! Run with: cargo test --test integration
//! Verbose:  TEST_VERBOSE=1 cargo test --test integration -- --nocapture

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

/// Test logging macro - prints when TEST_VERBOSE is set
macro_rules! test_log {
    ($level:expr, $($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            eprintln!("[{}] [integration:{}] {}",
                $level,
                line!(),
                format!($($arg)*)
            );
        }
    };
}

/// Variables that would leak the developer's setup into the binary
const ISOLATED_ENV: &[&str] = &[
    "CRA_BACKEND_URL",
    "CRA_TIMEOUT",
    "CRA_USERNAME",
    "CRA_PASSWORD",
    "CRA_LOG",
    "APP_USERNAME",
    "APP_PASSWORD",
    "FORCE_COLOR",
];

const PRINTLN_SOURCE: &str = "public class Hello {\n    public static void main(String[] args) {\n        System.out.println(\"hi\");\n    }\n}\n";

const CLEAN_SOURCE: &str = "public class Clean {\n    private final int x = 1;\n}\n";

fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cra"))
}

/// Fake review endpoint.
///
/// - `SLOW` in the code: answers after 3 seconds
/// - `BOOM`: 500 with a plain-text body
/// - `NOIMPROVED`: 200 without `improved_code`
/// - `System.out.println`: one bug, one suggestion, and improved code using a logger
async fn review(Json(body): Json<Value>) -> Response {
    let code = body["code"].as_str().unwrap_or_default().to_string();

    if code.contains("SLOW") {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    if code.contains("BOOM") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model unavailable").into_response();
    }
    if code.contains("NOIMPROVED") {
        return Json(json!({ "bugs": [] })).into_response();
    }

    if code.contains("System.out.println") {
        Json(json!({
            "bugs": ["Avoid System.out.println in method main()"],
            "suggestions": ["Inject a Logger instead of printing"],
            "improved_code": code.replace("System.out.println", "LOG.info"),
        }))
        .into_response()
    } else {
        Json(json!({ "improved_code": code })).into_response()
    }
}

/// Start the fake backend once for the whole test binary
fn backend_url() -> &'static str {
    static URL: OnceLock<String> = OnceLock::new();
    URL.get_or_init(|| {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind fake backend");
                tx.send(listener.local_addr().expect("local addr"))
                    .expect("send addr");
                let app = Router::new().route("/api/review", post(review));
                axum::serve(listener, app).await.expect("serve");
            });
        });
        let addr = rx.recv().expect("fake backend address");
        test_log!("SERVER", "fake backend on {}", addr);
        format!("http://{}/api/review", addr)
    })
}

/// A `cra` command with a clean environment and no config file
fn cra_at(url: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(get_binary_path());
    for var in ISOLATED_ENV {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd.args(["--no-config", "--backend-url", url]);
    cmd.args(args);
    cmd
}

fn cra(args: &[&str]) -> Command {
    cra_at(backend_url(), args)
}

fn run_cmd(mut cmd: Command, input: Option<&str>) -> (String, String, i32) {
    test_log!("RUN", "{:?}", cmd);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn cra");

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.unwrap_or_default().as_bytes())
            .expect("Failed to write to stdin");
    }

    let output = child.wait_with_output().expect("Failed to wait on cra");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);
    if !stderr.is_empty() {
        test_log!("STDERR", "{}", stderr);
    }

    (stdout, stderr, code)
}

fn run_stdin(input: &str, args: &[&str]) -> (String, String, i32) {
    run_cmd(cra(args), Some(input))
}

fn run_args(args: &[&str]) -> (String, String, i32) {
    run_cmd(cra(args), None)
}

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path.to_str().expect("utf-8 path").to_string()
}

// ============================================================================
// Paste Mode Tests
// ============================================================================

#[test]
fn test_e2e_paste_mode_report() {
    test_log!("START", "Paste mode full report");

    let (stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(stdout.contains("── Bugs ──\n  • Avoid System.out.println in method main()"));
    assert!(stdout.contains("  No security issues"));
    assert!(stdout.contains("  → Inject a Logger instead of printing"));
    assert!(stdout.contains("Your Code"));
    assert!(stdout.contains("│ Improved Code"));
    assert!(stdout.contains("~         LOG.info(\"hi\");"));
    assert!(stdout.contains("── Final Improved Code (Full) ──"));
    assert!(stdout.contains("  ✔ Avoid System.out.println — use a proper logger."));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_empty_input() {
    test_log!("START", "Empty input is never sent");

    let (stdout, stderr, code) = run_stdin("  \n\n", &[]);

    assert_eq!(code, 4, "Empty input should exit with code 4");
    assert!(stdout.is_empty());
    assert!(stderr.contains("No source text to review"));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_missing_improved_code() {
    test_log!("START", "Missing improved code falls back to original");

    let (stdout, _stderr, code) = run_stdin("class NOIMPROVED {}\n", &[]);

    assert_eq!(code, 0);
    assert!(stdout.contains("The reviewer did not generate improved code. Showing original."));
    assert!(stdout.contains("No differences found"));
    assert!(stdout.contains("No validation rules triggered."));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_unified_diff_style() {
    let (stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &["--diff-style", "unified"]);

    assert_eq!(code, 0);
    assert!(stdout.contains("--- Your Code\n+++ Improved Code\n@@ -1,5 +1,5 @@"));
    assert!(stdout.contains("-        System.out.println(\"hi\");\n+        LOG.info(\"hi\");"));
}

#[test]
fn test_e2e_section_filter() {
    let (stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &["--section", "bugs,rules"]);

    assert_eq!(code, 0);
    assert!(stdout.contains("── Bugs ──"));
    assert!(stdout.contains("── Rules Applied ──"));
    assert!(!stdout.contains("Differences"));
    assert!(!stdout.contains("Suggestions"));
}

// ============================================================================
// Backend Failure Tests
// ============================================================================

#[test]
fn test_e2e_server_error() {
    let (stdout, stderr, code) = run_stdin("class BOOM {}\n", &[]);

    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Backend error: 500"));
    assert!(stderr.contains("model unavailable"));
}

#[test]
fn test_e2e_backend_unreachable() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let url = format!("http://{}/api/review", addr);

    let (_stdout, stderr, code) = run_cmd(cra_at(&url, &[]), Some(CLEAN_SOURCE));

    assert_eq!(code, 1);
    assert!(stderr.contains("Failed to connect to backend"));
}

// ============================================================================
// Batch Tests
// ============================================================================

#[test]
fn test_e2e_batch_timeout_isolated() {
    test_log!("START", "Batch where the middle file times out");

    let dir = TempDir::new().expect("tempdir");
    let first = write_file(dir.path(), "First.java", PRINTLN_SOURCE);
    let slow = write_file(dir.path(), "Slow.java", "class SLOW {}\n");
    let third = write_file(dir.path(), "Third.java", CLEAN_SOURCE);

    let (stdout, stderr, code) = run_args(&["--timeout", "1", &first, &slow, &third]);

    assert_eq!(code, 1, "A failed file should make the run fail");
    assert!(stdout.contains(&format!("==> {} <==", first)));
    assert!(stdout.contains(&format!("==> {} <==", third)));
    assert!(stdout.contains("First.java (Original)"));
    assert!(stdout.contains("Third.java (Improved)"));
    assert_eq!(stdout.matches("── Bugs ──").count(), 2);
    assert!(stderr.contains(&format!("Error processing {}: Failed to connect to backend", slow)));
    assert!(stderr.contains("1 input(s) had errors"));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_recursive_discovery() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "A.java", CLEAN_SOURCE);
    write_file(dir.path(), "README.md", "# not reviewed");
    fs::create_dir(dir.path().join("pkg")).expect("mkdir");
    write_file(&dir.path().join("pkg"), "B.java", CLEAN_SOURCE);

    let root = dir.path().to_str().expect("utf-8 path");
    let (stdout, _stderr, code) = run_args(&["-r", root]);

    assert_eq!(code, 0);
    assert!(stdout.contains("A.java <=="));
    assert!(stdout.contains("B.java <=="));
    assert!(!stdout.contains("README.md"));
}

// ============================================================================
// Output Mode Tests
// ============================================================================

#[test]
fn test_e2e_json_output() {
    let (stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &["--json"]);

    assert_eq!(code, 0);
    let record: Value = serde_json::from_str(stdout.trim()).expect("stdout should be JSON");
    assert_eq!(record["status"], "ok");
    assert_eq!(record["file"], "stdin");
    assert_eq!(record["result"]["bugs"][0], "Avoid System.out.println in method main()");
    assert_eq!(record["rules"].as_array().map(Vec::len), Some(10));
    assert_eq!(record["rules"][0]["triggered"], true);
    assert_eq!(record["diff"]["changed"], 1);
}

#[test]
fn test_e2e_json_batch_records() {
    let dir = TempDir::new().expect("tempdir");
    let good = write_file(dir.path(), "Good.java", CLEAN_SOURCE);
    let bad = write_file(dir.path(), "Bad.java", "class BOOM {}\n");

    let (stdout, _stderr, code) = run_args(&["--json", &good, &bad]);

    assert_eq!(code, 1);
    let records: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["status"], "ok");
    assert_eq!(records[1]["error"]["kind"], "server_error");
    assert_eq!(records[1]["error"]["status"], 500);
}

#[test]
fn test_e2e_html_report() {
    let dir = TempDir::new().expect("tempdir");
    let report = dir.path().join("review.html");
    let report_arg = report.to_str().expect("utf-8 path");

    let (_stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &["--html", report_arg]);

    assert_eq!(code, 0);
    let html = fs::read_to_string(&report).expect("HTML report written");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("diff_chg"));
    assert!(html.contains("System.out.println(&quot;hi&quot;);"));
}

#[test]
fn test_e2e_check_mode() {
    let (_stdout, _stderr, code) = run_stdin(PRINTLN_SOURCE, &["--check"]);
    assert_eq!(code, 3, "Findings should exit with code 3 in check mode");

    let (_stdout, _stderr, code) = run_stdin(CLEAN_SOURCE, &["--check"]);
    assert_eq!(code, 0, "No findings should exit 0 in check mode");
}

#[test]
fn test_e2e_verbose_summary() {
    let (stdout, stderr, code) = run_stdin(PRINTLN_SOURCE, &["--verbose"]);
    let all = format!("{}{}", stdout, stderr);

    assert_eq!(code, 0);
    assert!(all.contains("Analyzing stdin..."));
    assert!(all.contains("Summary"));
    assert!(all.contains("1 reviewed, 0 failed"));
    assert!(stdout.contains("── Bugs ──"));
}

// ============================================================================
// Login Tests
// ============================================================================

fn login_cmd(password: &str) -> Command {
    let mut cmd = cra(&["--login", "--username", "admin"]);
    cmd.env("APP_USERNAME", "admin")
        .env("APP_PASSWORD", "s3cret")
        .env("CRA_PASSWORD", password);
    cmd
}

#[test]
fn test_e2e_login_rejected() {
    let (stdout, stderr, code) = run_cmd(login_cmd("guess"), Some(CLEAN_SOURCE));

    assert_eq!(code, 5);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Invalid username or password"));
}

#[test]
fn test_e2e_login_accepted() {
    let (stdout, _stderr, code) = run_cmd(login_cmd("s3cret"), Some(CLEAN_SOURCE));

    assert_eq!(code, 0);
    assert!(stdout.contains("── Bugs ──"));
}

#[test]
fn test_e2e_login_not_configured() {
    let mut cmd = cra(&["--login", "--username", "admin"]);
    cmd.env("CRA_PASSWORD", "s3cret");

    let (_stdout, stderr, code) = run_cmd(cmd, Some(CLEAN_SOURCE));

    assert_eq!(code, 5);
    assert!(stderr.contains("APP_USERNAME or APP_PASSWORD is not set"));
}

// ============================================================================
// Subcommand Tests
// ============================================================================

#[test]
fn test_e2e_rules_subcommand() {
    let (stdout, _stderr, code) = run_args(&["rules"]);

    assert_eq!(code, 0);
    assert!(stdout.contains(" 1. Avoid System.out.println — use a proper logger."));
    assert!(stdout.contains("    keyword: \"avoid system.out.println\""));
    assert!(stdout.contains("10. Avoid deeply nested if/else blocks — refactor logic."));
}

#[test]
fn test_e2e_diff_subcommand() {
    let dir = TempDir::new().expect("tempdir");
    let old = write_file(dir.path(), "Old.java", "a\nb\nc\n");
    let new = write_file(dir.path(), "New.java", "a\nB\nc\nd\n");

    let (stdout, _stderr, code) = run_args(&["diff", &old, &new, "--diff-style", "unified"]);

    assert_eq!(code, 0);
    assert!(stdout.contains(&format!("--- {}", old)));
    assert!(stdout.contains("@@ -1,3 +1,4 @@\n a\n-b\n+B\n c\n+d\n"));
}

#[test]
fn test_e2e_diff_subcommand_missing_file() {
    let (_stdout, stderr, code) = run_args(&["diff", "/no/such/Old.java", "/no/such/New.java"]);

    assert_eq!(code, 1);
    assert!(stderr.contains("/no/such/Old.java"));
}

#[test]
fn test_e2e_config_init_and_path() {
    let dir = TempDir::new().expect("tempdir");

    let mut init = cra(&["config", "init"]);
    init.current_dir(dir.path());
    let (_stdout, stderr, code) = run_cmd(init, None);
    assert_eq!(code, 0);
    assert!(stderr.contains("Created config file"));
    assert!(dir.path().join(".crarc").exists());

    let mut path = cra(&["config", "path"]);
    path.current_dir(dir.path());
    let (stdout, _stderr, code) = run_cmd(path, None);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with(".crarc"));

    let mut again = cra(&["config", "init"]);
    again.current_dir(dir.path());
    let (_stdout, stderr, code) = run_cmd(again, None);
    assert_eq!(code, 1);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_e2e_config_file_values() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_file(
        dir.path(),
        "cra.toml",
        "diff_style = \"unified\"\nrules = [\"Inject a Logger — no printing.\"]\n",
    );

    let mut cmd = Command::new(get_binary_path());
    for var in ISOLATED_ENV {
        cmd.env_remove(var);
    }
    cmd.args(["--config", &config, "--backend-url", backend_url()]);
    let (stdout, _stderr, code) = run_cmd(cmd, Some(PRINTLN_SOURCE));

    assert_eq!(code, 0);
    assert!(stdout.contains("@@ -1,5 +1,5 @@"));
    assert!(stdout.contains("  ✔ Inject a Logger — no printing."));
    assert!(!stdout.contains("✔ Avoid System.out.println"));
}

// ============================================================================
// Argument Error Tests
// ============================================================================

#[test]
fn test_e2e_invalid_wrap() {
    let (_stdout, stderr, code) = run_stdin(CLEAN_SOURCE, &["--wrap", "5"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("--wrap"));
}

#[test]
fn test_e2e_invalid_backend_url() {
    let (_stdout, stderr, code) = run_cmd(cra_at("ftp://example.com", &[]), Some(CLEAN_SOURCE));
    assert!(stderr.contains("http or https"));
    assert_eq!(code, 2);
}

#[test]
fn test_e2e_conflicting_flags() {
    let (_stdout, _stderr, code) = run_stdin(CLEAN_SOURCE, &["--json", "--verbose"]);
    assert_eq!(code, 2);
}

#[test]
fn test_e2e_help() {
    let (stdout, _stderr, code) = run_args(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("EXIT CODES"));
}
