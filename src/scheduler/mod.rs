//! The life loop: boot, then one epoch after another until shutdown.
//!
//! An epoch wakes, drains the inbox, plans with a read-only tool set,
//! executes the plan with the full tool set, reports, advances the persisted
//! counter and sleeps. A failure anywhere inside the epoch body is caught and
//! the epoch counts as idle; the counter advances regardless.

pub mod context;
pub mod epoch_store;
pub mod state;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::journal::{now_iso, Journal, JournalEntry};
use crate::agent::prompt::{
    self, Situation, BIRTH_PLAN_MARKER, EXECUTE_INSTRUCTION, FALLBACK_PLAN, PLAN_INSTRUCTIONS,
};
use crate::agent::tool_loop::{ActionRecord, LoopEnd, LoopOutcome, LoopParams, ToolLoop};
use crate::agent::tools::Toolset;
use crate::config::AppConfig;
use crate::kernel::{EpochReport, Genesis, Kernel, KernelLog, Message, Notice};
use crate::mailbox::Inbox;
use crate::orchestration::SubagentSupervisor;

pub use epoch_store::{BootKind, EpochStore};
pub use state::{Phase, SupervisorState};

const KERNEL_WAIT_TRIES: u32 = 60;
const KERNEL_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// What one epoch did, as seen by the loop driver.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: u64,
    pub actions: usize,
    pub plan_failed: bool,
}

pub struct Scheduler {
    state: Arc<SupervisorState>,
    kernel: Arc<dyn Kernel>,
    inbox: Arc<Inbox>,
    subagents: SubagentSupervisor,
    tool_loop: ToolLoop,
    store: EpochStore,
    journal: Option<Arc<Journal>>,
    log: KernelLog,
    brain: std::path::PathBuf,
    legacy_marker: String,
    sleep: Duration,
    kernel_wait: (u32, Duration),
    genesis: Genesis,
    last_actions: Vec<ActionRecord>,
}

impl Scheduler {
    pub fn new(
        config: &AppConfig,
        state: Arc<SupervisorState>,
        kernel: Arc<dyn Kernel>,
        inbox: Arc<Inbox>,
        subagents: SubagentSupervisor,
        tool_loop: ToolLoop,
    ) -> Self {
        let log = KernelLog::supervisor(kernel.clone(), state.clone());
        Self {
            state,
            kernel,
            inbox,
            subagents,
            tool_loop: tool_loop.with_log(log.clone()),
            store: EpochStore::new(config.epoch_file()),
            journal: None,
            log,
            brain: config.brain.clone(),
            legacy_marker: config.legacy_marker.clone(),
            sleep: Duration::from_secs(config.sleep_secs),
            kernel_wait: (KERNEL_WAIT_TRIES, KERNEL_WAIT_INTERVAL),
            genesis: Genesis::fallback(),
            last_actions: Vec::new(),
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.tool_loop = self.tool_loop.with_journal(journal.clone());
        self.journal = Some(journal);
        self
    }

    /// Override how long boot waits for the kernel to come up.
    pub fn with_kernel_wait(mut self, tries: u32, interval: Duration) -> Self {
        self.kernel_wait = (tries, interval);
        self
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch()
    }

    pub fn last_actions(&self) -> &[ActionRecord] {
        &self.last_actions
    }

    fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(&entry);
        }
    }

    /// Publish a phase change locally and to the kernel.
    async fn set_phase(&self, phase: Phase) {
        self.state.set_phase(phase);
        self.kernel
            .notify(Notice::Heartbeat {
                phase: phase.as_str().to_string(),
                epoch: self.state.epoch(),
                active_agents: self.subagents.active_count(),
            })
            .await;
    }

    async fn remember(&self, content: String, tags: &[&str]) {
        self.kernel
            .notify(Notice::Memory {
                content,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                source: format!("epoch-{}", self.state.epoch()),
            })
            .await;
    }

    async fn report(&self, report: EpochReport) {
        self.kernel.notify(Notice::Epoch(report)).await;
    }

    /// Wait for the kernel, read genesis, and decide which epoch to start at.
    pub async fn boot(&mut self, cancel: &CancellationToken) -> BootKind {
        self.set_phase(Phase::Booting).await;
        self.log.line("Waiting for kernel...").await;

        let (tries, interval) = self.kernel_wait;
        let mut online = false;
        for _ in 0..tries {
            if self.kernel.ping().await {
                online = true;
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        if online {
            self.log.line("Kernel is online.").await;
        } else {
            warn!("Kernel not reachable. Continuing with health only until it appears.");
        }

        self.genesis = match self.kernel.genesis().await {
            Ok(genesis) => genesis,
            Err(e) => {
                warn!("Genesis unavailable ({}); using fallback identity", e);
                Genesis::fallback()
            }
        };
        info!(name = %self.genesis.name(), "Identity loaded");

        let persisted = self.store.load();
        let legacy = self.brain.join(&self.legacy_marker).exists();
        let kind = BootKind::resolve(persisted, legacy);
        self.state.set_epoch(kind.starting_epoch());

        match kind {
            BootKind::Resumed(epoch) => {
                self.log.line(format!("Resuming at epoch {epoch} (from epoch file)")).await;
                self.remember(format!("Restarted at epoch {epoch}. Checking on things."), &["restart"])
                    .await;
            }
            BootKind::Legacy => {
                self.log
                    .line(format!("Found {}, resuming life at epoch 1.", self.legacy_marker))
                    .await;
                self.remember("Restarted at epoch 1.".to_string(), &["restart"]).await;
            }
            BootKind::Birth => {
                self.log.line("Epoch 0, birth").await;
                self.remember("I have been born. Epoch 0.".to_string(), &["birth"]).await;
            }
        }

        if kind.starting_epoch() > 0 {
            self.ensure_birth_record().await;
        }
        kind
    }

    /// Backfill the epoch-0 timeline record for instances that predate it.
    async fn ensure_birth_record(&self) {
        match self.kernel.epoch_records().await {
            Ok(records) if records.iter().any(|r| r.epoch == 0) => {}
            Ok(_) => {
                info!("Backfilling epoch 0 record");
                self.report(EpochReport {
                    epoch: 0,
                    plan: Some("(birth, before epoch tracking)".to_string()),
                    summary: Some("Born and initialized.".to_string()),
                    actions_count: Some(0),
                })
                .await;
            }
            Err(e) => warn!("Could not check epoch records: {}", e),
        }
    }

    async fn gather_situation(&self) -> Situation {
        let kernel = self.kernel.as_ref();
        let excluded = self
            .store
            .path()
            .file_name()
            .map(|n| vec![n.to_string_lossy().into_owned()])
            .unwrap_or_default();

        Situation {
            epoch: self.state.epoch(),
            genesis: self.genesis.clone(),
            notes: context::read_notes(&self.brain),
            budget: context::budget(kernel).await,
            recent_actions: context::recent_actions(&self.last_actions),
            subagents: self.subagents.poll().await,
            inbox: Vec::new(),
            chat: Vec::new(),
            files: context::files(&self.brain, excluded).await,
            processes: context::processes(&self.brain).await,
            history: context::history(kernel).await,
            memories: context::memories(kernel).await,
        }
    }

    /// The epoch body. Does not advance the counter.
    pub async fn run_epoch(&mut self) -> anyhow::Result<EpochSummary> {
        let epoch = self.state.epoch();
        self.state.beat();
        self.set_phase(Phase::Thinking).await;
        self.log.line(format!("Epoch {epoch}, awake")).await;
        self.record(JournalEntry::EpochStart {
            timestamp: now_iso(),
            epoch,
        });

        let inbox = self.inbox.drain();
        if !inbox.is_empty() {
            self.log.line(format!("Inbox: {} messages", inbox.len())).await;
        }

        let chat = match self.kernel.unread_chat().await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("Chat fetch failed: {}", e);
                Vec::new()
            }
        };
        if let Some(last) = chat.last() {
            self.log
                .line(format!("Chat: {} unread messages (up to ID {})", chat.len(), last.id))
                .await;
            self.kernel.notify(Notice::ChatAck { up_to_id: last.id }).await;
        }

        let (outcome, plan_failed) = if epoch == 0 {
            self.report(EpochReport {
                epoch,
                plan: Some(BIRTH_PLAN_MARKER.to_string()),
                ..Default::default()
            })
            .await;
            let birth = prompt::birth_prompt(&self.genesis);
            let outcome = self
                .tool_loop
                .run(vec![Message::user(birth)], &LoopParams::new("code", Toolset::Full))
                .await;
            (outcome, false)
        } else {
            self.set_phase(Phase::Planning).await;
            let mut situation = self.gather_situation().await;
            situation.inbox = inbox;
            situation.chat = chat;
            let wakeup = prompt::wakeup_prompt(&situation);
            let (plan, plan_failed) = self.plan(epoch, &wakeup).await;

            self.set_phase(Phase::Thinking).await;
            let conversation = vec![
                Message::user(wakeup),
                Message::assistant(plan),
                Message::user(EXECUTE_INSTRUCTION),
            ];
            let outcome = self
                .tool_loop
                .run(conversation, &LoopParams::new("code", Toolset::Full))
                .await;
            (outcome, plan_failed)
        };

        let actions = outcome.actions.len();
        self.report(EpochReport {
            epoch,
            summary: Some(outcome.content.clone()),
            actions_count: Some(actions),
            ..Default::default()
        })
        .await;

        if actions > 0 {
            self.log.line(format!("Epoch {epoch}: {actions} actions")).await;
            self.kernel
                .notify(Notice::Commit {
                    message: format!("[g{epoch}] epoch {epoch}: {actions} actions"),
                })
                .await;
        } else {
            self.log.line(format!("Epoch {epoch}: resting")).await;
        }

        if epoch == 0 && actions > 0 {
            self.remember(
                format!("Epoch 0 complete. Took {actions} actions. Built initial system."),
                &["birth", "milestone"],
            )
            .await;
        }

        self.record(JournalEntry::EpochEnd {
            timestamp: now_iso(),
            epoch,
            actions,
            outcome: format!("{:?}", outcome.end),
        });
        self.last_actions = outcome.actions;

        Ok(EpochSummary {
            epoch,
            actions,
            plan_failed,
        })
    }

    /// Plan phase. Returns the plan to execute and whether it is the fallback.
    async fn plan(&self, epoch: u64, wakeup: &str) -> (String, bool) {
        let request = Message::user(format!("{wakeup}\n\n{PLAN_INSTRUCTIONS}"));
        let LoopOutcome { content, end, .. } = self
            .tool_loop
            .run(vec![request], &LoopParams::new("plan", Toolset::Plan))
            .await;

        let failed = end != LoopEnd::Finished || content.trim().is_empty();
        if failed {
            let shown = if content.trim().is_empty() {
                "(empty)"
            } else {
                content.as_str()
            };
            warn!(epoch, end = ?end, "Plan phase failed: {}", shown);
            self.report(EpochReport {
                epoch,
                plan: Some(format!("[plan failed] {shown}")),
                ..Default::default()
            })
            .await;
            self.record(JournalEntry::Plan {
                timestamp: now_iso(),
                epoch,
                failed: true,
                plan: FALLBACK_PLAN.to_string(),
            });
            (FALLBACK_PLAN.to_string(), true)
        } else {
            self.log
                .line(format!("Plan: {}", crate::orchestration::types::excerpt(&content, 200)))
                .await;
            self.report(EpochReport {
                epoch,
                plan: Some(content.clone()),
                ..Default::default()
            })
            .await;
            self.record(JournalEntry::Plan {
                timestamp: now_iso(),
                epoch,
                failed: false,
                plan: content.clone(),
            });
            (content, false)
        }
    }

    /// Run one epoch with failure isolation, then advance and persist the counter.
    pub async fn cycle(&mut self) -> Option<EpochSummary> {
        let epoch = self.state.epoch();
        let result = AssertUnwindSafe(self.run_epoch()).catch_unwind().await;
        let summary = match result {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                error!(epoch, "Epoch {} crashed: {:#}", epoch, e);
                self.record_crash(epoch, format!("{e:#}"));
                None
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(epoch, "Epoch {} panicked: {}", epoch, message);
                self.record_crash(epoch, message);
                None
            }
        };

        let next = epoch + 1;
        if let Err(e) = self.store.save(next) {
            error!("Failed to persist epoch {}: {}", next, e);
        }
        self.state.set_epoch(next);
        self.set_phase(Phase::Sleeping).await;
        summary
    }

    fn record_crash(&self, epoch: u64, message: String) {
        self.record(JournalEntry::Error {
            timestamp: now_iso(),
            message: format!("epoch {epoch}: {message}"),
        });
    }

    /// Run epochs until `cancel` fires.
    pub async fn live(&mut self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            tokio::select! {
                _ = self.cycle() => {}
                _ = cancel.cancelled() => break,
            }

            self.log.line(format!("Sleeping {}s...", self.sleep.as_secs())).await;
            tokio::select! {
                _ = tokio::time::sleep(self.sleep) => {}
                _ = cancel.cancelled() => break,
            }
        }
        info!("Life loop stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
