//! Type definitions for the subagent subsystem.
//!
//! These types are the shared vocabulary between the
//! [`super::supervisor::SubagentSupervisor`], the `spawn_agent` tool, and the
//! worker process on the other side of the stdin handoff.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Caller-chosen identifier for a subagent task. Unique among running tasks.
pub type TaskId = String;

/// Characters of the prompt retained in the registry.
pub const PROMPT_EXCERPT_CHARS: usize = 200;

/// Lifecycle status of a subagent task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, worker not yet launched.
    Pending,
    Running,
    /// Worker exited with status 0.
    Completed,
    /// Worker exited non-zero, could not be launched, or was shut down.
    Failed,
    /// Killed by the supervisor after exceeding its timeout.
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a task, returned by [`super::supervisor::SubagentSupervisor::snapshot`].
#[derive(Clone, Debug, Serialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    /// First [`PROMPT_EXCERPT_CHARS`] characters of the prompt.
    pub prompt: String,
    pub intent: String,
    pub timeout_secs: u64,
    pub status: TaskStatus,
    pub pid: Option<u32>,
    /// ISO 8601 timestamp when the task was registered.
    pub spawned_at: String,
    pub elapsed_secs: u64,
}

/// What a worker is asked to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub prompt: String,
    pub intent: String,
    pub timeout_secs: u64,
}

/// Process-wide settings a worker needs to run its own tool loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub kernel_url: String,
    pub brain: PathBuf,
    pub inbox_url: String,
    pub think_timeout_secs: u64,
    pub shell_timeout_secs: u64,
    pub denylist: Vec<(String, String)>,
    pub security_log_path: PathBuf,
}

impl WorkerSettings {
    /// Settings for workers of a supervisor running with `config`.
    ///
    /// Workers start inside the brain directory, so every path they receive
    /// is absolute: `brain_root` as already canonicalized by the safety
    /// layer, and the security log resolved against the current directory.
    pub fn from_config(config: &AppConfig, brain_root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            kernel_url: config.kernel_url.clone(),
            brain: brain_root.to_path_buf(),
            inbox_url: config.inbox_url(),
            think_timeout_secs: config.think_timeout_secs,
            shell_timeout_secs: config.shell_timeout_secs,
            denylist: config.denylist.clone(),
            security_log_path: std::path::absolute(&config.security_log_path)?,
        })
    }
}

/// The JSON document written to a worker's stdin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub task: TaskAssignment,
    pub settings: WorkerSettings,
}

/// Truncate to at most `max` characters on a char boundary.
pub fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
