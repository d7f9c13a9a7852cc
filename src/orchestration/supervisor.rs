//! Registry and lifecycle control for subagent worker processes.
//!
//! [`SubagentSupervisor`] is the single source of truth for spawned workers.
//! It wraps a `HashMap` behind `Arc<Mutex<..>>`; the lock is held only for
//! check-and-insert and status transitions, never across an `.await`.
//!
//! Workers are OS processes in their own process group. They are polled with
//! `try_wait`, never awaited, so the life loop never blocks on a subagent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use super::types::{
    excerpt, TaskAssignment, TaskId, TaskInfo, TaskStatus, WorkerSettings, WorkerSpec,
    PROMPT_EXCERPT_CHARS,
};
use crate::agent::journal::{now_iso, Journal, JournalEntry};
use crate::error::SpawnError;
use crate::exec::kill_process_group;

/// Upper bound on waiting for a killed worker to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// The program launched for each subagent. The worker spec is written to its
/// stdin as a single JSON document.
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Re-execute the running binary with the hidden `worker` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec!["worker".to_string()],
        })
    }
}

/// Internal registry entry. Callers see [`TaskInfo`] snapshots.
struct AgentTask {
    info: TaskInfo,
    timeout: Duration,
    started: Instant,
    child: Option<Child>,
    /// Terminal status already included in a status summary.
    reported: bool,
}

impl AgentTask {
    fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[derive(Clone)]
pub struct SubagentSupervisor {
    tasks: Arc<Mutex<HashMap<TaskId, AgentTask>>>,
    launcher: Arc<WorkerCommand>,
    settings: Arc<WorkerSettings>,
    max_concurrent: usize,
    default_timeout: Duration,
    journal: Option<Arc<Journal>>,
    /// Summary lines of unreported tasks replaced by a respawn.
    carried: Arc<Mutex<Vec<String>>>,
}

impl SubagentSupervisor {
    pub fn new(
        launcher: WorkerCommand,
        settings: WorkerSettings,
        max_concurrent: usize,
        default_timeout: Duration,
    ) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            launcher: Arc::new(launcher),
            settings: Arc::new(settings),
            max_concurrent,
            default_timeout,
            journal: None,
            carried: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record spawns and terminal transitions in `journal`.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    fn record(&self, task_id: &str, event: &str, detail: String) {
        if let Some(journal) = &self.journal {
            journal.record(&JournalEntry::Subagent {
                timestamp: now_iso(),
                task_id: task_id.to_string(),
                event: event.to_string(),
                detail,
            });
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, AgentTask>> {
        // A poisoned registry is still structurally valid; keep using it.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn carried(&self) -> MutexGuard<'_, Vec<String>> {
        self.carried.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Launch a worker for `task_id`.
    ///
    /// The duplicate check, the ceiling check and the insert happen under one
    /// lock. Returns the worker's pid. A launch failure is recorded as a
    /// `Failed` task so it appears in the next status summary.
    pub fn spawn(
        &self,
        task_id: &str,
        prompt: &str,
        intent: &str,
        timeout: Option<Duration>,
    ) -> Result<u32, SpawnError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut tasks = self.lock();

        if tasks
            .get(task_id)
            .is_some_and(|existing| !existing.info.status.is_terminal())
        {
            return Err(SpawnError::AlreadyRunning(task_id.to_string()));
        }

        let running = tasks
            .values()
            .filter(|t| !t.info.status.is_terminal())
            .count();
        if running >= self.max_concurrent {
            return Err(SpawnError::CeilingReached(self.max_concurrent));
        }

        // A terminal task nobody has seen yet keeps its line in the next summary.
        if let Some(previous) = tasks.get(task_id).filter(|t| !t.reported) {
            self.carried()
                .push(format!("  [{}] {}", task_id, previous.info.status));
        }

        let mut task = AgentTask {
            info: TaskInfo {
                task_id: task_id.to_string(),
                prompt: excerpt(prompt, PROMPT_EXCERPT_CHARS),
                intent: intent.to_string(),
                timeout_secs: timeout.as_secs(),
                status: TaskStatus::Pending,
                pid: None,
                spawned_at: Utc::now().to_rfc3339(),
                elapsed_secs: 0,
            },
            timeout,
            started: Instant::now(),
            child: None,
            reported: false,
        };

        let spec = WorkerSpec {
            task: TaskAssignment {
                task_id: task_id.to_string(),
                prompt: prompt.to_string(),
                intent: intent.to_string(),
                timeout_secs: timeout.as_secs(),
            },
            settings: (*self.settings).clone(),
        };

        match self.launch(&spec) {
            Ok((child, pid)) => {
                task.info.status = TaskStatus::Running;
                task.info.pid = Some(pid);
                task.child = Some(child);
                tasks.insert(task_id.to_string(), task);
                drop(tasks);
                info!(
                    task_id,
                    pid,
                    intent,
                    timeout_secs = timeout.as_secs(),
                    "Spawned subagent"
                );
                self.record(task_id, "spawned", format!("pid {pid}, intent {intent}"));
                Ok(pid)
            }
            Err(message) => {
                warn!(task_id, "Failed to launch subagent: {}", message);
                task.info.status = TaskStatus::Failed;
                tasks.insert(task_id.to_string(), task);
                drop(tasks);
                self.record(task_id, "launch_failed", message.clone());
                Err(SpawnError::LaunchFailed {
                    task_id: task_id.to_string(),
                    message,
                })
            }
        }
    }

    fn launch(&self, spec: &WorkerSpec) -> Result<(Child, u32), String> {
        #[allow(unused_imports)]
        use std::os::unix::process::CommandExt;

        let payload =
            serde_json::to_vec(spec).map_err(|e| format!("failed to encode worker spec: {e}"))?;

        let mut child = Command::new(&self.launcher.program)
            .args(&self.launcher.args)
            .current_dir(&self.settings.brain)
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn worker process: {e}"))?;

        let pid = child
            .id()
            .ok_or_else(|| "worker exited before its pid could be read".to_string())?;

        if let Some(mut stdin) = child.stdin.take() {
            let task_id = spec.task.task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!(task_id = %task_id, "Failed to hand task to worker: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        Ok((child, pid))
    }

    /// Check every task, enforce timeouts, and return the status summary.
    ///
    /// One line per task; `(no subagents)` when there are none. Each
    /// terminal task appears in exactly one summary and is dropped from the
    /// registry on the following poll. The registry lock is never taken while
    /// the carried lines are locked.
    pub async fn poll(&self) -> String {
        let mut lines = std::mem::take(&mut *self.carried());
        let mut events = Vec::new();
        let mut to_reap = Vec::new();

        {
            let mut tasks = self.lock();
            tasks.retain(|_, task| !(task.info.status.is_terminal() && task.reported));

            let mut order: Vec<(Instant, TaskId)> = tasks
                .iter()
                .map(|(id, task)| (task.started, id.clone()))
                .collect();
            order.sort();

            for (_, id) in order {
                let Some(task) = tasks.get_mut(&id) else {
                    continue;
                };
                let elapsed = task.elapsed_secs();
                task.info.elapsed_secs = elapsed;

                if task.info.status.is_terminal() {
                    task.reported = true;
                    lines.push(format!("  [{}] {}", id, task.info.status));
                    continue;
                }

                let exited = match task.child.as_mut() {
                    Some(child) => child.try_wait(),
                    None => Ok(None),
                };

                match exited {
                    Ok(Some(status)) => {
                        task.child = None;
                        task.reported = true;
                        if status.success() {
                            task.info.status = TaskStatus::Completed;
                            info!(task_id = %id, elapsed, "Subagent completed");
                            lines.push(format!("  [{}] completed (ran {}s)", id, elapsed));
                            events.push((id.clone(), "completed", format!("ran {elapsed}s")));
                        } else {
                            task.info.status = TaskStatus::Failed;
                            let code = status
                                .code()
                                .map_or_else(|| "signal".to_string(), |c| c.to_string());
                            info!(task_id = %id, elapsed, exit = %code, "Subagent failed");
                            lines.push(format!(
                                "  [{}] failed (exit {}, ran {}s)",
                                id, code, elapsed
                            ));
                            events.push((id.clone(), "failed", format!("exit {code}, ran {elapsed}s")));
                        }
                    }
                    Err(e) => {
                        task.child = None;
                        task.reported = true;
                        task.info.status = TaskStatus::Failed;
                        warn!(task_id = %id, "Could not check subagent: {}", e);
                        lines.push(format!("  [{}] failed ({})", id, e));
                        events.push((id.clone(), "failed", e.to_string()));
                    }
                    Ok(None) if task.started.elapsed() > task.timeout => {
                        kill_process_group(task.info.pid);
                        if let Some(mut child) = task.child.take() {
                            let _ = child.start_kill();
                            to_reap.push(child);
                        }
                        task.reported = true;
                        task.info.status = TaskStatus::TimedOut;
                        warn!(
                            task_id = %id,
                            elapsed,
                            "Subagent timed out after {}s, terminated",
                            elapsed
                        );
                        lines.push(format!("  [{}] TIMED OUT after {}s", id, elapsed));
                        events.push((id.clone(), "timed_out", format!("killed after {elapsed}s")));
                    }
                    Ok(None) => {
                        lines.push(format!(
                            "  [{}] running ({}s / {}s)",
                            id,
                            elapsed,
                            task.timeout.as_secs()
                        ));
                    }
                }
            }
        }

        for (id, event, detail) in events {
            self.record(&id, event, detail);
        }
        reap(to_reap).await;

        if lines.is_empty() {
            "(no subagents)".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Number of tasks currently running.
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|t| t.info.status == TaskStatus::Running)
            .count()
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.lock().get(task_id).map(|t| t.info.status)
    }

    /// Snapshot of every tracked task, oldest first.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let tasks = self.lock();
        let mut entries: Vec<_> = tasks
            .values()
            .map(|t| {
                let mut info = t.info.clone();
                info.elapsed_secs = t.elapsed_secs();
                (t.started, info)
            })
            .collect();
        entries.sort_by_key(|(started, _)| *started);
        entries.into_iter().map(|(_, info)| info).collect()
    }

    /// Kill every running worker's process group, reap it, and mark it failed.
    pub async fn shutdown(&self) {
        let mut to_reap = Vec::new();
        let mut stopped = Vec::new();
        {
            let mut tasks = self.lock();
            for (id, task) in tasks.iter_mut() {
                if task.info.status.is_terminal() {
                    continue;
                }
                kill_process_group(task.info.pid);
                if let Some(mut child) = task.child.take() {
                    let _ = child.start_kill();
                    to_reap.push(child);
                }
                task.info.status = TaskStatus::Failed;
                info!(task_id = %id, "Cleaned up subagent");
                stopped.push(id.clone());
            }
        }
        for id in stopped {
            self.record(&id, "shutdown", "killed at supervisor shutdown".to_string());
        }
        reap(to_reap).await;
    }
}

async fn reap(children: Vec<Child>) {
    for mut child in children {
        if tokio::time::timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
            warn!(pid = ?child.id(), "Killed subagent did not exit in time");
        }
    }
}
