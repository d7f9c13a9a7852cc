use super::schema::{AppConfig, PartialConfig};
use crate::safety::defaults::default_denylist;
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For denylist: REPLACE semantics (if self has Some, use it entirely).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            kernel_url: self.kernel_url.or(fallback.kernel_url),
            brain: self.brain.or(fallback.brain),
            legacy_marker: self.legacy_marker.or(fallback.legacy_marker),
            port: self.port.or(fallback.port),
            sleep_secs: self.sleep_secs.or(fallback.sleep_secs),
            think_timeout_secs: self.think_timeout_secs.or(fallback.think_timeout_secs),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
            max_subagents: self.max_subagents.or(fallback.max_subagents),
            subagent_timeout_secs: self.subagent_timeout_secs.or(fallback.subagent_timeout_secs),
            denylist: self.denylist.or(fallback.denylist),
            security_log_path: self.security_log_path.or(fallback.security_log_path),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let brain = self.brain.unwrap_or_else(|| PathBuf::from("./brain"));
        let security_log_path = self
            .security_log_path
            .unwrap_or_else(|| brain.join(".security.log"));

        AppConfig {
            kernel_url: self
                .kernel_url
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            brain,
            legacy_marker: self.legacy_marker.unwrap_or_else(|| "main.py".to_string()),
            port: self.port.unwrap_or(9001),
            sleep_secs: self.sleep_secs.unwrap_or(30),
            think_timeout_secs: self.think_timeout_secs.unwrap_or(300),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(60),
            max_subagents: self.max_subagents.unwrap_or(3),
            subagent_timeout_secs: self.subagent_timeout_secs.unwrap_or(600),
            denylist: self.denylist.unwrap_or_else(default_denylist),
            security_log_path,
        }
    }
}
