use std::time::Instant;

use tempfile::TempDir;
use vigil::exec::{execute_shell, execute_shell_in, ExecResult, ProcessGroup};

fn brain() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

fn ran(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ExecResult {
    ExecResult {
        stdout: stdout.into(),
        stderr: stderr.into(),
        exit_code,
        timed_out: false,
    }
}

// ============================================================
// Capture
// ============================================================

#[tokio::test]
async fn captures_stdout_stderr_and_exit_code() {
    let dir = brain();
    let result = execute_shell("echo out; echo err >&2; exit 3", dir.path(), 5)
        .await
        .unwrap();
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(result.exit_code, Some(3));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn runs_in_the_given_directory() {
    let dir = brain();
    let canonical = std::fs::canonicalize(dir.path()).unwrap();
    let result = execute_shell("pwd", dir.path(), 5).await.unwrap();
    assert_eq!(result.stdout.trim(), canonical.to_str().unwrap());
}

#[tokio::test]
async fn stdin_is_closed() {
    let dir = brain();
    let start = Instant::now();
    let result = execute_shell("cat", dir.path(), 5).await.unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert!(start.elapsed().as_secs() < 3, "cat must see EOF immediately");
}

// ============================================================
// Timeout behavior
// ============================================================

#[tokio::test]
async fn timeout_kills_the_process_group() {
    let dir = brain();
    let start = Instant::now();
    let result = execute_shell("sleep 60 & sleep 60; echo never", dir.path(), 1)
        .await
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert!(!result.stdout.contains("never"));
    assert!(
        start.elapsed().as_secs() < 6,
        "timeout should fire promptly, took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn backgrounded_child_does_not_hold_the_call_open() {
    let dir = brain();
    let start = Instant::now();
    let result = execute_shell("nohup sleep 30 >/dev/null 2>&1 & echo started", dir.path(), 10)
        .await
        .unwrap();
    assert_eq!(result.stdout, "started\n");
    assert!(!result.timed_out);
    assert!(start.elapsed().as_secs() < 5);
}

// ============================================================
// Process groups
// ============================================================

/// Prints the shell's pid and its process group id.
const PID_AND_GROUP: &str = "echo $$ $(cut -d' ' -f5 /proc/$$/stat)";

#[tokio::test]
async fn default_shell_leads_its_own_group() {
    let dir = brain();
    let result = execute_shell(PID_AND_GROUP, dir.path(), 5).await.unwrap();
    let ids: Vec<&str> = result.stdout.split_whitespace().collect();
    assert_eq!(ids.len(), 2, "{:?}", result.stdout);
    assert_eq!(ids[0], ids[1]);
}

#[tokio::test]
async fn inherited_group_is_the_callers() {
    let dir = brain();
    let result = execute_shell_in(PID_AND_GROUP, dir.path(), 5, ProcessGroup::Inherited)
        .await
        .unwrap();
    let ids: Vec<&str> = result.stdout.split_whitespace().collect();
    assert_eq!(ids.len(), 2, "{:?}", result.stdout);
    assert_eq!(ids[1], nix::unistd::getpgrp().to_string());
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn inherited_group_timeout_kills_the_shell() {
    let dir = brain();
    let start = Instant::now();
    let result = execute_shell_in("sleep 30", dir.path(), 1, ProcessGroup::Inherited)
        .await
        .unwrap();
    assert!(result.timed_out);
    assert!(start.elapsed().as_secs() < 6, "took {:?}", start.elapsed());
}

// ============================================================
// Tool rendering
// ============================================================

#[test]
fn tool_output_shows_stdout_only_on_success() {
    assert_eq!(ran("hello\n", "", Some(0)).to_tool_output(60), "hello");
}

#[test]
fn tool_output_appends_stderr_and_exit_code() {
    assert_eq!(
        ran("partial\n", "boom\n", Some(2)).to_tool_output(60),
        "partial\n\nSTDERR:\nboom\n\nEXIT CODE: 2"
    );
}

#[test]
fn tool_output_placeholder_when_empty() {
    assert_eq!(ran("", "", Some(0)).to_tool_output(60), "(no output)");
}

#[test]
fn tool_output_for_timeout_names_the_limit() {
    let result = ExecResult {
        timed_out: true,
        ..ran("", "", None)
    };
    assert_eq!(
        result.to_tool_output(7),
        "ERROR: Command timed out after 7 seconds. Use nohup for long-running processes."
    );
}

#[test]
fn exec_result_serializes() {
    let parsed = serde_json::to_value(ran("output", "", Some(0))).unwrap();
    assert_eq!(parsed["stdout"], "output");
    assert_eq!(parsed["exit_code"], 0);
    assert_eq!(parsed["timed_out"], false);
}
