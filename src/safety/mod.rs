pub mod command_filter;
pub mod defaults;
pub mod workspace;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use command_filter::{BlockedCommand, CommandFilter};
use workspace::WorkspaceGuard;

use crate::config::AppConfig;
use crate::error::StartupError;
use crate::exec::{execute_shell_in, ExecResult, ProcessGroup};

/// Outcome of a command sent through the safety layer.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Rejected by the denylist; no process was spawned.
    Blocked(BlockedCommand),
    Ran(ExecResult),
}

/// Combined safety layer: checks commands against the denylist, enforces
/// brain-directory write boundaries, and delegates allowed commands to the
/// shell executor with timeout enforcement.
///
/// This is the single entry point for all agent command execution. Tools
/// never call [`execute_shell_in`] directly.
pub struct SafetyLayer {
    command_filter: CommandFilter,
    workspace_guard: WorkspaceGuard,
    timeout_secs: u64,
    security_log_path: PathBuf,
    process_group: ProcessGroup,
}

impl SafetyLayer {
    /// Build a SafetyLayer from the resolved application configuration.
    pub fn new(config: &AppConfig) -> Result<Self, StartupError> {
        Self::from_parts(
            &config.brain,
            &config.denylist,
            config.shell_timeout_secs,
            config.security_log_path.clone(),
        )
    }

    /// Build a SafetyLayer without a full [`AppConfig`] (used by workers).
    pub fn from_parts(
        brain: &Path,
        denylist: &[(String, String)],
        timeout_secs: u64,
        security_log_path: PathBuf,
    ) -> Result<Self, StartupError> {
        let command_filter = CommandFilter::new(denylist)
            .map_err(|e| StartupError::Safety(format!("invalid denylist: {}", e)))?;

        let workspace_guard = WorkspaceGuard::new(brain)
            .map_err(|e| StartupError::Safety(format!("brain directory unusable: {}", e)))?;

        Ok(Self {
            command_filter,
            workspace_guard,
            timeout_secs,
            security_log_path,
            process_group: ProcessGroup::Own,
        })
    }

    /// Run commands in `group` instead of a fresh group per command.
    pub fn with_process_group(mut self, group: ProcessGroup) -> Self {
        self.process_group = group;
        self
    }

    /// Execute a shell command through the safety pipeline.
    ///
    /// 1. Check command against the denylist.
    /// 2. If blocked: append to the security log and return
    ///    [`CommandOutcome::Blocked`] without spawning anything.
    /// 3. If allowed: delegate to [`execute_shell_in`] in the brain directory.
    pub async fn execute(&self, command: &str) -> anyhow::Result<CommandOutcome> {
        if let Some(blocked) = self.command_filter.check(command) {
            tracing::warn!(reason = %blocked.reason, "Blocked command: {}", command);
            self.log_blocked_command(&blocked);
            return Ok(CommandOutcome::Blocked(blocked));
        }

        let result = execute_shell_in(
            command,
            self.workspace_guard.canonical_root(),
            self.timeout_secs,
            self.process_group,
        )
        .await?;
        Ok(CommandOutcome::Ran(result))
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Get the canonical brain root path.
    pub fn workspace_root(&self) -> &Path {
        self.workspace_guard.canonical_root()
    }

    pub fn workspace_guard(&self) -> &WorkspaceGuard {
        &self.workspace_guard
    }

    /// Append a JSON line to the security log for a blocked command.
    /// A write failure is a warning; the block itself still stands.
    fn log_blocked_command(&self, blocked: &BlockedCommand) {
        let entry = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "blocked": true,
            "substring": blocked.substring,
            "reason": blocked.reason,
            "command": blocked.command,
        });

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.security_log_path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", entry) {
                    tracing::warn!(
                        "Failed to write to security log at {}: {}",
                        self.security_log_path.display(),
                        e
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to open security log at {}: {}",
                    self.security_log_path.display(),
                    e
                );
            }
        }
    }
}
