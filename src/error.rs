use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors related to shell command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn shell process: {0}")]
    SpawnFailed(String),

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors returned by calls to the kernel API.
///
/// Every variant means "unreachable" to callers: best-effort calls log it and
/// fall back to a default, `think` turns it into the unreachable sentinel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel request to {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("kernel returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("kernel response from {path} could not be decoded: {message}")]
    Decode { path: String, message: String },
}

/// Reasons a subagent spawn is refused.
///
/// The `Display` text is what the agent sees as the tool result, so every
/// variant starts with the `ERROR:` marker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("ERROR: agent '{0}' is already running")]
    AlreadyRunning(String),

    #[error("ERROR: max concurrent subagents ({0}) reached. Wait for one to finish.")]
    CeilingReached(usize),

    #[error("ERROR: failed to launch subagent '{task_id}': {message}")]
    LaunchFailed { task_id: String, message: String },
}

/// Failures that abort the process before the mailbox is serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to bind mailbox on {addr}: {source}")]
    MailboxBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize safety layer: {0}")]
    Safety(String),
}
