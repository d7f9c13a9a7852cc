//! Tool schema definitions and guarded execution.
//!
//! The tool kinds form a closed set; which of them a caller may use is
//! decided by a fixed [`Toolset`]. Execution always yields text: failures
//! come back as `ERROR:`-prefixed strings (never panics or `Err` variants) so
//! the model can observe the error and react.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::kernel::{Kernel, ToolDefinition};
use crate::orchestration::SubagentSupervisor;
use crate::safety::{CommandOutcome, SafetyLayer};

/// Marker that flags a tool result as a failure.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Default wait after a successful restart request.
pub const RESTART_GRACE: Duration = Duration::from_secs(30);

pub fn is_error(result: &str) -> bool {
    result.starts_with(ERROR_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Write,
    Execute,
    Restart,
    SpawnAgent,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Read,
        ToolKind::Write,
        ToolKind::Execute,
        ToolKind::Restart,
        ToolKind::SpawnAgent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Read => "read",
            ToolKind::Write => "write",
            ToolKind::Execute => "execute",
            ToolKind::Restart => "restart",
            ToolKind::SpawnAgent => "spawn_agent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Parameters checked generically before the action runs.
    /// `spawn_agent` validates its own arguments.
    fn required(self) -> &'static [&'static str] {
        match self {
            ToolKind::Read => &["path"],
            ToolKind::Write => &["path", "content"],
            ToolKind::Execute => &["command"],
            ToolKind::Restart | ToolKind::SpawnAgent => &[],
        }
    }

    pub fn definition(self, default_subagent_timeout: u64) -> ToolDefinition {
        let (description, parameters) = match self {
            ToolKind::Read => (
                "Read a file from your brain directory. Path is relative to the brain directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative file path (e.g. 'app/main.py')"}
                    },
                    "required": ["path"]
                }),
            ),
            ToolKind::Write => (
                "Write a file to your brain directory. Creates directories as needed. Path is relative to the brain directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative file path (e.g. 'app/main.py')"},
                        "content": {"type": "string", "description": "Full file content to write"}
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolKind::Execute => (
                "Run a shell command in the brain directory. Use for installing packages, starting servers, checking processes, git, curl, anything.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Shell command to run"}
                    },
                    "required": ["command"]
                }),
            ),
            ToolKind::Restart => (
                "Emergency restart. Kills everything (including your apps) and restarts the supervisor from scratch. Only use if you are truly stuck.",
                json!({"type": "object", "properties": {}, "required": []}),
            ),
            ToolKind::SpawnAgent => (
                "Spawn a subagent to work on a task in parallel. The subagent gets read, write and execute tools (no restart, no spawning). It runs independently and posts its result to your inbox when done.",
                json!({
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string", "description": "Unique identifier for this task (e.g. 'fix-css')"},
                        "prompt": {"type": "string", "description": "Full instructions for the subagent. It has no context beyond what you tell it."},
                        "intent": {"type": "string", "description": "Routing intent: 'code', 'chat', 'plan'. Default: 'code'"},
                        "timeout": {"type": "integer", "description": format!("Max seconds before the subagent is killed. Default: {default_subagent_timeout}")}
                    },
                    "required": ["task_id", "prompt"]
                }),
            ),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// The fixed tool subsets offered in each context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolset {
    /// Everything; the primary agent's execute phase.
    Full,
    /// Read, write and execute; subagent workers.
    Subagent,
    /// Read and execute; the planning phase.
    Plan,
}

impl Toolset {
    pub fn kinds(self) -> &'static [ToolKind] {
        match self {
            Toolset::Full => &ToolKind::ALL,
            Toolset::Subagent => &[ToolKind::Read, ToolKind::Write, ToolKind::Execute],
            Toolset::Plan => &[ToolKind::Read, ToolKind::Execute],
        }
    }

    pub fn contains(self, kind: ToolKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Resolve a tool name requested by the model against this set.
    pub fn lookup(self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|kind| self.contains(*kind))
    }

    pub fn definitions(self, default_subagent_timeout: u64) -> Vec<ToolDefinition> {
        self.kinds()
            .iter()
            .map(|kind| kind.definition(default_subagent_timeout))
            .collect()
    }
}

/// Executes tool calls against the brain directory, the kernel and the
/// subagent supervisor.
pub struct ToolExecutor {
    safety: Arc<SafetyLayer>,
    kernel: Arc<dyn Kernel>,
    subagents: Option<SubagentSupervisor>,
    restart_grace: Duration,
}

impl ToolExecutor {
    pub fn new(safety: Arc<SafetyLayer>, kernel: Arc<dyn Kernel>) -> Self {
        Self {
            safety,
            kernel,
            subagents: None,
            restart_grace: RESTART_GRACE,
        }
    }

    /// Enable `spawn_agent`. Without a supervisor the tool reports an error.
    pub fn with_subagents(mut self, subagents: SubagentSupervisor) -> Self {
        self.subagents = Some(subagents);
        self
    }

    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    pub fn brain(&self) -> &Path {
        self.safety.workspace_root()
    }

    fn default_subagent_timeout(&self) -> u64 {
        self.subagents
            .as_ref()
            .map_or(0, |s| s.default_timeout().as_secs())
    }

    /// Tool definitions advertised to the kernel for `toolset`.
    pub fn definitions(&self, toolset: Toolset) -> Vec<ToolDefinition> {
        toolset.definitions(self.default_subagent_timeout())
    }

    /// Run one tool call and return its textual result.
    pub async fn execute(&self, toolset: Toolset, name: &str, args: &Map<String, Value>) -> String {
        let Some(kind) = toolset.lookup(name) else {
            return format!("{ERROR_PREFIX} Unknown tool: {name}");
        };

        let required = kind.required();
        if required.iter().any(|key| !args.contains_key(*key)) {
            let given: Vec<&str> = args.keys().map(String::as_str).collect();
            return format!(
                "{ERROR_PREFIX} tool '{}' requires parameters: {}. Got: {}",
                name,
                required.join(", "),
                given.join(", ")
            );
        }

        let outcome = match kind {
            ToolKind::Read => self.read(args).await,
            ToolKind::Write => self.write(args).await,
            ToolKind::Execute => self.run_command(args).await,
            ToolKind::Restart => Ok(self.restart().await),
            ToolKind::SpawnAgent => Ok(self.spawn_agent(args)),
        };

        outcome.unwrap_or_else(|e| format!("{ERROR_PREFIX} tool '{name}' failed: {e:#}"))
    }

    async fn read(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
        let path = string_arg(args, "path")?;
        let full = self.safety.workspace_guard().resolve(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(format!("{ERROR_PREFIX} File not found: {path}"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
        let path = string_arg(args, "path")?;
        let content = string_arg(args, "content")?;
        let guard = self.safety.workspace_guard();

        if !guard.is_write_allowed(Path::new(path))? {
            warn!(path, "Rejected write outside the brain directory");
            return Ok(format!(
                "{ERROR_PREFIX} path '{path}' is outside the brain directory"
            ));
        }

        let full = guard.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(format!("OK: Wrote {} bytes to {}", content.len(), path))
    }

    async fn run_command(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
        let command = string_arg(args, "command")?;
        match self.safety.execute(command).await? {
            CommandOutcome::Blocked(blocked) => Ok(blocked.to_tool_message()),
            CommandOutcome::Ran(result) => Ok(result.to_tool_output(self.safety.timeout_secs())),
        }
    }

    async fn restart(&self) -> String {
        warn!("Emergency restart requested");
        match self.kernel.request_restart().await {
            Ok(()) => {
                info!(grace_secs = self.restart_grace.as_secs(), "Kernel acknowledged restart");
                tokio::time::sleep(self.restart_grace).await;
                "OK: restart requested".to_string()
            }
            Err(e) => {
                error!("Couldn't reach kernel for restart ({}); exiting", e);
                self.stop_subagents().await;
                std::process::exit(0);
            }
        }
    }

    /// Kill every worker. `process::exit` skips their `kill_on_drop` guards.
    async fn stop_subagents(&self) {
        if let Some(subagents) = &self.subagents {
            subagents.shutdown().await;
        }
    }

    fn spawn_agent(&self, args: &Map<String, Value>) -> String {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or("");
        let prompt = args.get("prompt").and_then(Value::as_str).unwrap_or("");
        if task_id.is_empty() || prompt.is_empty() {
            return format!("{ERROR_PREFIX} task_id and prompt are required");
        }
        let intent = args
            .get("intent")
            .and_then(Value::as_str)
            .filter(|i| !i.is_empty())
            .unwrap_or("code");
        let timeout = args.get("timeout").and_then(parse_secs).map(Duration::from_secs);

        let Some(subagents) = &self.subagents else {
            return format!("{ERROR_PREFIX} subagents are not available here");
        };

        match subagents.spawn(task_id, prompt, intent, timeout) {
            Ok(pid) => format!(
                "OK: Subagent '{task_id}' spawned (PID {pid}). Results will appear in your inbox."
            ),
            Err(e) => e.to_string(),
        }
    }
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("parameter '{key}' must be a string"))
}

/// Accept a positive integer or a numeric string.
fn parse_secs(value: &Value) -> Option<u64> {
    let secs = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    secs.filter(|secs| *secs > 0)
}
