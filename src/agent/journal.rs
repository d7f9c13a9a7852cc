//! JSONL event journal.
//!
//! Writes structured events to timestamped JSONL files stored alongside the
//! brain directory (not inside it, so the agent's own file listing never sees
//! them). The supervisor writes `journal-{ISO8601}.jsonl` in
//! `{brain_parent}/.vigil-logs/`; each worker writes into its own
//! `sub-{task_id}/` subdirectory.
//!
//! Uses synchronous `std::fs` since writes are small, buffered, and flushed
//! after each event.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

/// Returns the current UTC time as an ISO 8601 string with milliseconds.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A structured journal entry serialized as a single JSON line.
///
/// Tagged with `event_type` so each line is self-describing.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JournalEntry {
    EpochStart {
        timestamp: String,
        epoch: u64,
    },
    EpochEnd {
        timestamp: String,
        epoch: u64,
        actions: usize,
        outcome: String,
    },
    /// The plan phase result, or the fallback that replaced it.
    Plan {
        timestamp: String,
        epoch: u64,
        failed: bool,
        plan: String,
    },
    Think {
        timestamp: String,
        round: usize,
        intent: String,
        messages: usize,
    },
    AssistantText {
        timestamp: String,
        round: usize,
        content: String,
    },
    ToolCall {
        timestamp: String,
        round: usize,
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        timestamp: String,
        round: usize,
        call_id: String,
        tool: String,
        result: String,
        is_error: bool,
    },
    LoopEnd {
        timestamp: String,
        rounds: usize,
        reason: String,
        actions: usize,
    },
    Subagent {
        timestamp: String,
        task_id: String,
        event: String,
        detail: String,
    },
    Error {
        timestamp: String,
        message: String,
    },
}

/// Append-only JSONL journal, shareable across tasks behind an `Arc`.
pub struct Journal {
    writer: Mutex<BufWriter<fs::File>>,
    path: PathBuf,
}

impl Journal {
    /// Open the supervisor journal for the given brain directory.
    pub fn for_supervisor(brain: &Path) -> anyhow::Result<Self> {
        Self::open_in(&log_dir_for(brain)?)
    }

    /// Open a worker journal under `sub-{task_id}/`.
    pub fn for_worker(brain: &Path, task_id: &str) -> anyhow::Result<Self> {
        let dir = log_dir_for(brain)?.join(format!("sub-{}", sanitize(task_id)));
        Self::open_in(&dir)
    }

    /// Create `dir` if needed and open a fresh timestamped journal file in it.
    pub fn open_in(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)?;

        let run_id = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = dir.join(format!("journal-{run_id}.jsonl"));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Serialize an entry as a single JSON line and flush.
    pub fn write(&self, entry: &JournalEntry) -> anyhow::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("journal writer poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Like [`Journal::write`], but a failure is only a warning.
    pub fn record(&self, entry: &JournalEntry) {
        if let Err(e) = self.write(entry) {
            tracing::warn!("Failed to write journal at {}: {:#}", self.path.display(), e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `{brain_parent}/.vigil-logs/`.
fn log_dir_for(brain: &Path) -> anyhow::Result<PathBuf> {
    let parent = brain.parent().ok_or_else(|| {
        anyhow::anyhow!("Brain path '{}' has no parent directory", brain.display())
    })?;
    Ok(parent.join(".vigil-logs"))
}

fn sanitize(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
