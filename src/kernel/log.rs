use std::sync::Arc;

use super::{Kernel, Notice};
use crate::scheduler::state::SupervisorState;

/// Mirrors operational log lines to the kernel's log API.
///
/// Lines are also emitted through `tracing` at info level, so call sites use
/// one statement for both destinations.
#[derive(Clone)]
pub struct KernelLog {
    kernel: Arc<dyn Kernel>,
    event: &'static str,
    source: LogSource,
}

#[derive(Clone)]
enum LogSource {
    Supervisor(Arc<SupervisorState>),
    Subagent(String),
}

impl KernelLog {
    /// Lines prefixed `[vigil|g<epoch>]`, tagged with the current epoch.
    pub fn supervisor(kernel: Arc<dyn Kernel>, state: Arc<SupervisorState>) -> Self {
        Self {
            kernel,
            event: "vigil_log",
            source: LogSource::Supervisor(state),
        }
    }

    /// Lines prefixed `[subagent:<id>]`.
    pub fn subagent(kernel: Arc<dyn Kernel>, task_id: &str) -> Self {
        Self {
            kernel,
            event: "subagent_log",
            source: LogSource::Subagent(task_id.to_string()),
        }
    }

    fn prefix_and_epoch(&self) -> (String, u64) {
        match &self.source {
            LogSource::Supervisor(state) => {
                let epoch = state.epoch();
                (format!("[vigil|g{epoch}]"), epoch)
            }
            LogSource::Subagent(task_id) => (format!("[subagent:{task_id}]"), 0),
        }
    }

    pub async fn line(&self, message: impl AsRef<str>) {
        let (prefix, epoch) = self.prefix_and_epoch();
        let line = format!("{} {}", prefix, message.as_ref());
        tracing::info!("{}", line);
        self.kernel
            .notify(Notice::Log {
                event: self.event.to_string(),
                message: line,
                epoch,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scripted::ScriptedKernel;

    #[tokio::test]
    async fn supervisor_lines_carry_epoch_prefix() {
        let kernel = Arc::new(ScriptedKernel::default());
        let state = Arc::new(SupervisorState::new());
        state.set_epoch(7);
        let log = KernelLog::supervisor(kernel.clone(), state);

        log.line("awake").await;

        assert_eq!(
            kernel.notices(),
            vec![Notice::Log {
                event: "vigil_log".into(),
                message: "[vigil|g7] awake".into(),
                epoch: 7,
            }]
        );
    }

    #[tokio::test]
    async fn subagent_lines_use_subagent_event() {
        let kernel = Arc::new(ScriptedKernel::default());
        let log = KernelLog::subagent(kernel.clone(), "fix-css");
        log.line("started").await;
        match &kernel.notices()[0] {
            Notice::Log { event, message, .. } => {
                assert_eq!(event, "subagent_log");
                assert_eq!(message, "[subagent:fix-css] started");
            }
            other => panic!("unexpected notice {other:?}"),
        }
    }
}
