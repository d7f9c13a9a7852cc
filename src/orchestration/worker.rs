//! The worker side of a subagent.
//!
//! The supervisor launches `vigil worker` in its own process group and writes
//! a [`WorkerSpec`] to its stdin. The worker runs one private tool loop over
//! the task, posts a single result to the supervisor's inbox, and exits.
//! It never talks to the supervisor any other way.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use super::types::{excerpt, WorkerSpec};
use crate::agent::journal::Journal;
use crate::agent::prompt::subagent_preamble;
use crate::agent::tool_loop::{LoopEnd, LoopOutcome, LoopParams, ToolLoop, SUBAGENT_MAX_ROUNDS};
use crate::agent::tools::{ToolExecutor, Toolset};
use crate::exec::ProcessGroup;
use crate::kernel::{HttpKernel, Kernel, KernelLog, Message};
use crate::mailbox::SUBAGENT_SOURCE_PREFIX;
use crate::safety::SafetyLayer;

/// Longest result text posted back to the inbox.
pub const RESULT_MAX_CHARS: usize = 2000;

const INBOX_TIMEOUT: Duration = Duration::from_secs(10);

/// What a finished worker reports, and the exit code it leaves with.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub source: String,
    pub message: String,
    pub exit_code: i32,
}

impl WorkerReport {
    pub fn from_outcome(task_id: &str, outcome: &LoopOutcome) -> Self {
        let (message, exit_code) = match outcome.end {
            LoopEnd::Finished if outcome.content.trim().is_empty() => ("(no output)".to_string(), 0),
            LoopEnd::Finished => (outcome.content.clone(), 0),
            LoopEnd::LoopLimit => (
                format!(
                    "Hit tool loop limit ({SUBAGENT_MAX_ROUNDS} iterations). Partial work done."
                ),
                0,
            ),
            LoopEnd::Unreachable => (outcome.content.clone(), 1),
        };
        Self {
            source: format!("{SUBAGENT_SOURCE_PREFIX}{task_id}"),
            message: excerpt(&message, RESULT_MAX_CHARS),
            exit_code,
        }
    }

    /// Report for a worker that could not set up its tool loop.
    pub fn setup_failed(task_id: &str, reason: &str) -> Self {
        Self {
            source: format!("{SUBAGENT_SOURCE_PREFIX}{task_id}"),
            message: excerpt(&format!("ERROR: subagent could not start: {reason}"), RESULT_MAX_CHARS),
            exit_code: 1,
        }
    }
}

pub fn read_spec(reader: impl Read) -> anyhow::Result<WorkerSpec> {
    serde_json::from_reader(reader).context("failed to parse worker spec from stdin")
}

/// Run the task's tool loop against `kernel` and build the report.
pub async fn run_task(spec: &WorkerSpec, kernel: Arc<dyn Kernel>) -> anyhow::Result<WorkerReport> {
    let task = &spec.task;
    let settings = &spec.settings;

    // Commands stay in the worker's group so a timeout kill reaches them.
    let safety = match SafetyLayer::from_parts(
        &settings.brain,
        &settings.denylist,
        settings.shell_timeout_secs,
        settings.security_log_path.clone(),
    ) {
        Ok(safety) => safety.with_process_group(ProcessGroup::Inherited),
        Err(e) => {
            warn!(task_id = %task.task_id, "Worker could not start: {}", e);
            return Ok(WorkerReport::setup_failed(&task.task_id, &e.to_string()));
        }
    };
    let tools = Arc::new(ToolExecutor::new(Arc::new(safety), kernel.clone()));
    let log = KernelLog::subagent(kernel.clone(), &task.task_id);

    let mut tool_loop = ToolLoop::new(kernel, tools)
        .with_max_rounds(SUBAGENT_MAX_ROUNDS)
        .with_log(log.clone());
    match Journal::for_worker(&settings.brain, &task.task_id) {
        Ok(journal) => tool_loop = tool_loop.with_journal(Arc::new(journal)),
        Err(e) => warn!("Worker journal unavailable: {:#}", e),
    }

    log.line(format!("Starting ({} intent)", task.intent)).await;
    let params = LoopParams::new(task.intent.clone(), Toolset::Subagent)
        .with_system(subagent_preamble(&task.task_id))
        .requested_by(format!("{SUBAGENT_SOURCE_PREFIX}{}", task.task_id));
    let outcome = tool_loop
        .run(vec![Message::user(task.prompt.clone())], &params)
        .await;

    log.line(format!(
        "Finished: {:?} after {} rounds, {} actions",
        outcome.end,
        outcome.rounds,
        outcome.actions.len()
    ))
    .await;
    Ok(WorkerReport::from_outcome(&task.task_id, &outcome))
}

/// POST the report to the supervisor's inbox.
pub async fn post_result(inbox_url: &str, report: &WorkerReport) -> anyhow::Result<()> {
    let client = reqwest::Client::builder().no_proxy().build()?;
    client
        .post(inbox_url)
        .json(&json!({ "source": report.source, "message": report.message }))
        .timeout(INBOX_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("failed to reach inbox at {inbox_url}"))?
        .error_for_status()
        .context("inbox rejected the result")?;
    Ok(())
}

/// Entry point of `vigil worker`. Returns the process exit code.
pub async fn run_worker() -> anyhow::Result<i32> {
    let spec = read_spec(std::io::stdin().lock())?;
    let settings = &spec.settings;
    info!(task_id = %spec.task.task_id, intent = %spec.task.intent, "Worker starting");

    let kernel: Arc<dyn Kernel> = Arc::new(HttpKernel::new(
        settings.kernel_url.clone(),
        Duration::from_secs(settings.think_timeout_secs),
    )?);

    let report = run_task(&spec, kernel).await?;
    if let Err(e) = post_result(&settings.inbox_url, &report).await {
        warn!(task_id = %spec.task.task_id, "Could not deliver result: {:#}", e);
    }
    Ok(report.exit_code)
}
