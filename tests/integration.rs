use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdigest_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pdigest");
    path
}

/// Config whose every path lives under a temp dir. `extra` is appended verbatim.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[search]
query = "causal"
max_results = 2

[paths]
papers_dir = "{root}/papers"
summaries_dir = "{root}/summaries"
history_file = "{root}/history.json"
session_file = "{root}/auth_state.json"
{extra}"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("digest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdigest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdigest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdigest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_help_lists_flags() {
    let output = Command::new(pdigest_binary())
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--init-auth"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_missing_session_fails_before_fetching() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_pdigest(&config_path, &[]);
    assert!(!success, "run should fail: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("--init-auth"), "stderr={}", stderr);
    assert!(!stdout.contains("ok"));

    // Nothing was searched or written.
    assert!(!tmp.path().join("history.json").exists());
    assert!(!tmp.path().join("papers").exists());
}

#[test]
fn test_invalid_backoff_config_rejected() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[backoff]
base_delay_secs = 10.0
max_delay_secs = 2.0
"#,
    );

    let (_, stderr, success) = run_pdigest(&config_path, &[]);
    assert!(!success);
    assert!(stderr.contains("base_delay_secs"), "stderr={}", stderr);
}

#[test]
fn test_malformed_config_rejected() {
    let (_tmp, config_path) = setup_test_env("[timing\nidle_secs = ");

    let (_, stderr, success) = run_pdigest(&config_path, &[]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse config file"), "stderr={}", stderr);
}
