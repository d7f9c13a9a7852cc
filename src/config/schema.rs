use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Slack added on top of sleep + think timeout before a heartbeat counts as stale.
pub const HEARTBEAT_BUFFER_SECS: u64 = 60;

/// The TOML file structure for vigil.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub mailbox: Option<MailboxConfig>,
    pub subagents: Option<SubagentConfig>,
    pub safety: Option<SafetyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub kernel_url: Option<String>,
    pub brain: Option<String>,
    /// File whose presence marks an installation that predates the epoch file.
    pub legacy_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    pub sleep_secs: Option<u64>,
    pub think_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MailboxConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct SubagentConfig {
    pub max_concurrent: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyConfig {
    pub shell_timeout_secs: Option<u64>,
    /// If specified, fully replaces the default denylist.
    pub denylist: Option<Vec<DenylistEntry>>,
    pub security_log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenylistEntry {
    pub substring: String,
    pub reason: String,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub kernel_url: String,
    pub brain: PathBuf,
    pub legacy_marker: String,
    pub port: u16,
    pub sleep_secs: u64,
    pub think_timeout_secs: u64,
    pub shell_timeout_secs: u64,
    pub max_subagents: usize,
    pub subagent_timeout_secs: u64,
    /// (substring, reason) pairs rejected by the execute tool.
    pub denylist: Vec<(String, String)>,
    pub security_log_path: PathBuf,
}

impl AppConfig {
    /// Where the epoch counter is persisted.
    pub fn epoch_file(&self) -> PathBuf {
        self.brain.join(".epoch")
    }

    /// Heartbeat age beyond which `/health` reports unhealthy.
    pub fn max_staleness(&self) -> Duration {
        Duration::from_secs(self.sleep_secs + self.think_timeout_secs + HEARTBEAT_BUFFER_SECS)
    }

    /// URL subagent workers post their results to.
    pub fn inbox_url(&self) -> String {
        format!("http://127.0.0.1:{}/inbox", self.port)
    }
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub kernel_url: Option<String>,
    pub brain: Option<PathBuf>,
    pub legacy_marker: Option<String>,
    pub port: Option<u16>,
    pub sleep_secs: Option<u64>,
    pub think_timeout_secs: Option<u64>,
    pub shell_timeout_secs: Option<u64>,
    pub max_subagents: Option<usize>,
    pub subagent_timeout_secs: Option<u64>,
    pub denylist: Option<Vec<(String, String)>>,
    pub security_log_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Flatten the sectioned file layout into a mergeable partial.
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let schedule = self.schedule;
        let subagents = self.subagents;
        let safety = self.safety;

        PartialConfig {
            kernel_url: general.as_ref().and_then(|g| g.kernel_url.clone()),
            brain: general.as_ref().and_then(|g| g.brain.as_ref().map(PathBuf::from)),
            legacy_marker: general.and_then(|g| g.legacy_marker),
            port: self.mailbox.and_then(|m| m.port),
            sleep_secs: schedule.as_ref().and_then(|s| s.sleep_secs),
            think_timeout_secs: schedule.and_then(|s| s.think_timeout_secs),
            max_subagents: subagents.as_ref().and_then(|s| s.max_concurrent),
            subagent_timeout_secs: subagents.and_then(|s| s.timeout_secs),
            shell_timeout_secs: safety.as_ref().and_then(|s| s.shell_timeout_secs),
            denylist: safety.as_ref().and_then(|s| {
                s.denylist.as_ref().map(|entries| {
                    entries
                        .iter()
                        .map(|e| (e.substring.clone(), e.reason.clone()))
                        .collect()
                })
            }),
            security_log_path: safety.and_then(|s| s.security_log.map(PathBuf::from)),
        }
    }
}
