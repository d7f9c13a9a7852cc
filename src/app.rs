//! Process wiring for `vigil run`: builds every component from the resolved
//! config, serves the mailbox, drives the life loop and shuts down on signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::journal::Journal;
use crate::agent::tool_loop::ToolLoop;
use crate::agent::tools::ToolExecutor;
use crate::cli::RunArgs;
use crate::config;
use crate::kernel::{HttpKernel, Kernel};
use crate::mailbox::{self, Inbox, MailboxState};
use crate::orchestration::{SubagentSupervisor, WorkerCommand, WorkerSettings};
use crate::safety::SafetyLayer;
use crate::scheduler::{Scheduler, SupervisorState};

/// Cancel `token` on Ctrl-C or SIGTERM.
fn install_signal_handlers(token: CancellationToken) {
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received Ctrl+C, shutting down");
            on_interrupt.cancel();
        }
    });

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
                token.cancel();
            }
            Err(e) => warn!("Could not install SIGTERM handler: {}", e),
        }
    });
}

pub async fn run_supervisor(args: RunArgs) -> anyhow::Result<()> {
    let config = config::load_config(&args)?;
    info!(
        kernel = %config.kernel_url,
        brain = %config.brain.display(),
        port = config.port,
        sleep_secs = config.sleep_secs,
        "Config loaded"
    );

    let safety = Arc::new(SafetyLayer::new(&config)?);
    info!(
        brain = %safety.workspace_root().display(),
        timeout_secs = safety.timeout_secs(),
        denylist = config.denylist.len(),
        "Safety layer initialized"
    );

    let kernel: Arc<dyn Kernel> = Arc::new(HttpKernel::new(
        config.kernel_url.clone(),
        Duration::from_secs(config.think_timeout_secs),
    )?);

    let journal = match Journal::for_supervisor(&config.brain) {
        Ok(journal) => {
            info!(path = %journal.path().display(), "Journal opened");
            Some(Arc::new(journal))
        }
        Err(e) => {
            warn!("Journal unavailable: {:#}", e);
            None
        }
    };

    let launcher = WorkerCommand::current_exe().context("could not locate the vigil binary")?;
    let settings = WorkerSettings::from_config(&config, safety.workspace_root())
        .context("could not resolve worker paths")?;
    let mut subagents = SubagentSupervisor::new(
        launcher,
        settings,
        config.max_subagents,
        Duration::from_secs(config.subagent_timeout_secs),
    );
    if let Some(journal) = &journal {
        subagents = subagents.with_journal(journal.clone());
    }
    let state = Arc::new(SupervisorState::new());
    let inbox = Arc::new(Inbox::new());

    // The mailbox must be up before the first epoch; a bind failure ends the process.
    let listener = mailbox::bind(config.port).await?;
    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone());

    let router = mailbox::build_router(MailboxState {
        state: state.clone(),
        inbox: inbox.clone(),
        subagents: subagents.clone(),
        max_staleness: config.max_staleness(),
    });
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let tools = Arc::new(ToolExecutor::new(safety, kernel.clone()).with_subagents(subagents.clone()));
    let tool_loop = ToolLoop::new(kernel.clone(), tools);
    let mut scheduler = Scheduler::new(
        &config,
        state.clone(),
        kernel,
        inbox,
        subagents.clone(),
        tool_loop,
    );
    if let Some(journal) = journal {
        scheduler = scheduler.with_journal(journal);
    }

    let life_cancel = cancel.clone();
    let life = tokio::spawn(async move {
        scheduler.boot(&life_cancel).await;
        scheduler.live(life_cancel).await;
    });

    if let Err(e) = life.await {
        // Health reports unhealthy from here on; the mailbox keeps answering.
        error!("Life loop died: {}", e);
        state.mark_dead();
        subagents.shutdown().await;
        cancel.cancelled().await;
    }

    subagents.shutdown().await;
    cancel.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Mailbox server error: {}", e),
        Err(e) => warn!("Mailbox server task failed: {}", e),
    }

    info!("Supervisor stopped");
    Ok(())
}
