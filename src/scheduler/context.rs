//! Gathers the pieces of the situational prompt. Every source degrades to a
//! placeholder text on failure.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::agent::prompt::NOTES_FILE;
use crate::agent::tool_loop::ActionRecord;
use crate::exec::execute_shell;
use crate::kernel::Kernel;
use crate::orchestration::types::excerpt;

const MAX_LISTED_FILES: usize = 60;
const RECENT_ACTIONS: usize = 10;
const HISTORY_COMMITS: usize = 8;
pub const RECENT_MEMORIES: usize = 5;
const PROCESS_COMMAND: &str = "ps -eo pid,etime,args | head -20";
const PROCESS_TIMEOUT_SECS: u64 = 5;

pub fn read_notes(brain: &Path) -> String {
    match std::fs::read_to_string(brain.join(NOTES_FILE)) {
        Ok(text) => text.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => format!(
            "(You haven't created {NOTES_FILE} yet. Write one with your own priorities, habits and goals. It will be included every time you wake.)"
        ),
        Err(e) => {
            debug!("Could not read notes: {}", e);
            format!("(could not read {NOTES_FILE})")
        }
    }
}

pub fn recent_actions(actions: &[ActionRecord]) -> String {
    if actions.is_empty() {
        return "None.".to_string();
    }
    let start = actions.len().saturating_sub(RECENT_ACTIONS);
    serde_json::to_string_pretty(&actions[start..]).unwrap_or_else(|_| "None.".to_string())
}

pub async fn budget(kernel: &dyn Kernel) -> String {
    match kernel.budget().await {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(e) => {
            debug!("Budget unavailable: {}", e);
            "(could not reach kernel)".to_string()
        }
    }
}

pub async fn history(kernel: &dyn Kernel) -> String {
    match kernel.history().await {
        Ok(commits) if commits.is_empty() => "(no commits yet)".to_string(),
        Ok(commits) => commits
            .iter()
            .take(HISTORY_COMMITS)
            .map(|c| format!("  {} {}", excerpt(&c.hash, 7), c.message))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            debug!("History unavailable: {}", e);
            "(could not fetch history)".to_string()
        }
    }
}

pub async fn memories(kernel: &dyn Kernel) -> String {
    match kernel.memories(RECENT_MEMORIES).await {
        Ok(memories) if memories.is_empty() => "(no memories yet)".to_string(),
        Ok(memories) => memories
            .iter()
            .map(|m| {
                let tags = if m.tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", m.tags.join(", "))
                };
                format!("  - {}{}", excerpt(&m.content, 120), tags)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            debug!("Memories unavailable: {}", e);
            "(could not fetch memories)".to_string()
        }
    }
}

pub async fn processes(brain: &Path) -> String {
    match execute_shell(PROCESS_COMMAND, brain, PROCESS_TIMEOUT_SECS).await {
        Ok(result) if !result.timed_out && !result.stdout.trim().is_empty() => {
            result.stdout.trim().to_string()
        }
        Ok(_) => "(none found, your app may not be running!)".to_string(),
        Err(e) => {
            debug!("Process listing failed: {}", e);
            "(could not check)".to_string()
        }
    }
}

/// Depth-first listing of the brain, `./`-relative, skipping `.git` and the
/// named hidden files.
pub async fn files(brain: &Path, excluded: Vec<String>) -> String {
    let root = brain.to_path_buf();
    let listing = tokio::task::spawn_blocking(move || list_files(&root, &excluded, MAX_LISTED_FILES))
        .await;
    match listing {
        Ok(Ok(entries)) if entries.is_empty() => "(empty, no files yet)".to_string(),
        Ok(Ok(entries)) => entries.join("\n"),
        Ok(Err(e)) => {
            debug!("File listing failed: {}", e);
            "(could not list files)".to_string()
        }
        Err(_) => "(could not list files)".to_string(),
    }
}

pub fn list_files(root: &Path, excluded: &[String], limit: usize) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?.filter_map(Result::ok).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".git" || excluded.iter().any(|x| *x == name) {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push(format!("./{}", relative.display()));
            if out.len() >= limit {
                return Ok(out);
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                subdirs.push(path);
            }
        }
        // Reverse so the alphabetically first subdirectory is visited next.
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(out)
}
