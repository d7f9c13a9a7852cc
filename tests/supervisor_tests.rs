use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vigil::config::PartialConfig;
use vigil::error::SpawnError;
use vigil::orchestration::{SubagentSupervisor, TaskStatus, WorkerCommand, WorkerSettings};
use vigil::safety::SafetyLayer;

fn supervisor(tmp: &TempDir, script: &str, max: usize) -> SubagentSupervisor {
    let settings = WorkerSettings {
        brain: tmp.path().to_path_buf(),
        ..Default::default()
    };
    SubagentSupervisor::new(
        WorkerCommand::new("sh", &["-c", script]),
        settings,
        max,
        Duration::from_secs(60),
    )
}

async fn poll_until<F: Fn(&SubagentSupervisor) -> bool>(sup: &SubagentSupervisor, done: F) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let summary = sup.poll().await;
        if done(sup) || Instant::now() > deadline {
            return summary;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Live means present in /proc and not a zombie.
fn is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z'),
        Err(_) => false,
    }
}

async fn wait_until_dead(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while is_alive(pid) {
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}

/// `target` spelled relative to the current directory.
fn relative_to_cwd(target: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.join(target.strip_prefix("/").unwrap())
}

// ============================================================
// Concurrency ceiling
// ============================================================

#[tokio::test]
async fn ceiling_rejects_the_extra_spawn() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "sleep 30", 2);
    sup.spawn("a", "p", "code", None).unwrap();
    sup.spawn("b", "p", "code", None).unwrap();

    let err = sup.spawn("c", "p", "code", None).unwrap_err();
    assert_eq!(err, SpawnError::CeilingReached(2));
    assert_eq!(
        err.to_string(),
        "ERROR: max concurrent subagents (2) reached. Wait for one to finish."
    );
    assert_eq!(sup.active_count(), 2);
    assert!(sup.status("c").is_none());
    sup.shutdown().await;
}

#[tokio::test]
async fn finished_tasks_free_their_slot() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "cat > /dev/null; exit 0", 1);
    sup.spawn("quick", "p", "code", None).unwrap();
    poll_until(&sup, |s| s.status("quick") == Some(TaskStatus::Completed)).await;

    assert!(sup.spawn("next", "p", "code", None).is_ok());
    sup.shutdown().await;
}

// ============================================================
// Exit status
// ============================================================

#[tokio::test]
async fn exit_zero_is_completed_and_reported_once() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "cat > /dev/null; exit 0", 3);
    sup.spawn("ok", "p", "code", None).unwrap();

    let summary = poll_until(&sup, |s| s.status("ok") == Some(TaskStatus::Completed)).await;
    assert!(summary.contains("[ok] completed (ran"), "{summary}");

    // Reported tasks drop out on the following poll.
    assert_eq!(sup.poll().await, "(no subagents)");
    assert!(sup.status("ok").is_none());
}

#[tokio::test]
async fn nonzero_exit_is_failed_with_code() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "cat > /dev/null; exit 3", 3);
    sup.spawn("bad", "p", "code", None).unwrap();

    let summary = poll_until(&sup, |s| s.status("bad") == Some(TaskStatus::Failed)).await;
    assert!(summary.contains("[bad] failed (exit 3, ran"), "{summary}");
}

#[tokio::test]
async fn worker_receives_its_spec_on_stdin() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "cat > spec.json", 3);
    sup.spawn("t9", "build the thing", "plan", Some(Duration::from_secs(45))).unwrap();
    poll_until(&sup, |s| s.status("t9") == Some(TaskStatus::Completed)).await;

    let spec: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("spec.json")).unwrap()).unwrap();
    assert_eq!(spec["task"]["task_id"], "t9");
    assert_eq!(spec["task"]["prompt"], "build the thing");
    assert_eq!(spec["task"]["intent"], "plan");
    assert_eq!(spec["task"]["timeout_secs"], 45);
}

#[tokio::test]
async fn relative_brain_reaches_workers_as_an_absolute_path() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let config = PartialConfig {
        brain: Some(relative_to_cwd(&root.join("brain"))),
        security_log_path: Some(relative_to_cwd(&root.join("security.log"))),
        ..Default::default()
    }
    .finalize();
    assert!(config.brain.is_relative());

    let safety = SafetyLayer::new(&config).unwrap();
    let settings = WorkerSettings::from_config(&config, safety.workspace_root()).unwrap();
    let sup = SubagentSupervisor::new(
        WorkerCommand::new("sh", &["-c", "pwd -P > cwd.txt; cat > spec.json"]),
        settings,
        3,
        Duration::from_secs(60),
    );
    sup.spawn("rel", "p", "code", None).unwrap();
    poll_until(&sup, |s| s.status("rel") == Some(TaskStatus::Completed)).await;

    let brain = root.join("brain");
    let cwd = std::fs::read_to_string(brain.join("cwd.txt")).unwrap();
    assert_eq!(Path::new(cwd.trim()), brain);

    let spec: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(brain.join("spec.json")).unwrap()).unwrap();
    assert_eq!(spec["settings"]["brain"], brain.to_str().unwrap());
    let log = Path::new(spec["settings"]["security_log_path"].as_str().unwrap());
    assert!(log.is_absolute());
    assert!(log.ends_with("security.log"));
    assert!(!brain.join("brain").exists());
}

#[tokio::test]
async fn launch_failure_is_recorded_as_failed() {
    let tmp = TempDir::new().unwrap();
    let sup = SubagentSupervisor::new(
        WorkerCommand::new(tmp.path().join("no-such-binary"), &[]),
        WorkerSettings {
            brain: tmp.path().to_path_buf(),
            ..Default::default()
        },
        3,
        Duration::from_secs(60),
    );
    let err = sup.spawn("x", "p", "code", None).unwrap_err();
    assert!(err.to_string().starts_with("ERROR:"));
    assert_eq!(sup.status("x"), Some(TaskStatus::Failed));
    assert!(sup.poll().await.contains("[x] failed"));
}

// ============================================================
// Timeout enforcement
// ============================================================

#[tokio::test]
async fn overdue_worker_is_killed_and_timed_out() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "sleep 30 & echo $! > bg.pid; sleep 30", 3);
    let pid = sup
        .spawn("slow", "p", "code", Some(Duration::from_millis(200)))
        .unwrap();

    let summary = poll_until(&sup, |s| s.status("slow") == Some(TaskStatus::TimedOut)).await;
    assert!(summary.contains("[slow] TIMED OUT after"), "{summary}");
    assert_eq!(sup.active_count(), 0);

    assert!(wait_until_dead(pid).await, "worker {pid} survived its timeout");
    let background: u32 = std::fs::read_to_string(tmp.path().join("bg.pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        wait_until_dead(background).await,
        "worker child {background} survived its timeout"
    );

    // Reported once, then dropped.
    assert_eq!(sup.poll().await, "(no subagents)");
}

#[tokio::test]
async fn running_tasks_report_elapsed_and_timeout() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "sleep 30", 3);
    sup.spawn("busy", "p", "code", None).unwrap();
    assert_eq!(sup.poll().await, "  [busy] running (0s / 60s)");
    sup.shutdown().await;
}

// ============================================================
// Shutdown
// ============================================================

#[tokio::test]
async fn shutdown_kills_and_marks_failed() {
    let tmp = TempDir::new().unwrap();
    let sup = supervisor(&tmp, "sleep 30", 3);
    sup.spawn("a", "p", "code", None).unwrap();
    sup.spawn("b", "p", "code", None).unwrap();

    let started = Instant::now();
    sup.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sup.active_count(), 0);
    assert_eq!(sup.status("a"), Some(TaskStatus::Failed));
    assert_eq!(sup.status("b"), Some(TaskStatus::Failed));
}
