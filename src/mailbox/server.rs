use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::{Inbox, InboxMessage};
use crate::error::StartupError;
use crate::orchestration::SubagentSupervisor;
use crate::scheduler::state::{now_ms, Phase, SupervisorState};

/// Shared state for the mailbox handlers.
#[derive(Clone)]
pub struct MailboxState {
    pub state: Arc<SupervisorState>,
    pub inbox: Arc<Inbox>,
    pub subagents: SubagentSupervisor,
    pub max_staleness: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub epoch: u64,
    pub alive: bool,
    pub phase: Phase,
    pub heartbeat_age: u64,
    pub active_subagent_count: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

/// Pure health evaluation against an explicit clock.
pub fn evaluate_health(
    state: &SupervisorState,
    active_subagent_count: usize,
    max_staleness: Duration,
    now_ms: i64,
) -> HealthReport {
    let age = state.heartbeat_age(now_ms);
    let alive = state.alive();
    let healthy = alive && age <= max_staleness;
    HealthReport {
        status: if healthy { "ok" } else { "unhealthy" },
        epoch: state.epoch(),
        alive,
        phase: state.phase(),
        heartbeat_age: age.as_secs(),
        active_subagent_count,
    }
}

/// Build the Axum router for `/health` and `/inbox`.
pub fn build_router(state: MailboxState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/inbox", post(inbox_handler))
        .with_state(state)
}

/// Bind the mailbox listener on all interfaces. Failure here is fatal at boot.
pub async fn bind(port: u16) -> Result<TcpListener, StartupError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::MailboxBind {
            addr: addr.clone(),
            source,
        })?;
    info!("Mailbox listening on {} (health + inbox)", addr);
    Ok(listener)
}

async fn health_handler(State(mailbox): State<MailboxState>) -> impl IntoResponse {
    let report = evaluate_health(
        &mailbox.state,
        mailbox.subagents.active_count(),
        mailbox.max_staleness,
        now_ms(),
    );
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

#[derive(Debug, Deserialize)]
struct InboxPost {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

fn message_required() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": "message required" })),
    )
}

// The body is parsed by hand so that posts without a JSON content type are
// still accepted.
async fn inbox_handler(
    State(mailbox): State<MailboxState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let parsed: InboxPost = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Rejected inbox post: {}", e);
            return message_required();
        }
    };

    let message = match parsed.message {
        Some(message) if !message.is_empty() => message,
        _ => return message_required(),
    };
    let source = parsed.source.unwrap_or_else(|| "unknown".to_string());

    debug!(source = %source, "Inbox message received");
    mailbox.inbox.post(InboxMessage { message, source });
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeat_is_healthy() {
        let state = SupervisorState::new();
        state.beat_at(1_000_000);
        let report = evaluate_health(&state, 2, Duration::from_secs(90), 1_030_000);
        assert!(report.is_healthy());
        assert_eq!(report.heartbeat_age, 30);
        assert_eq!(report.active_subagent_count, 2);
    }

    #[test]
    fn stale_heartbeat_is_unhealthy() {
        let state = SupervisorState::new();
        state.beat_at(0);
        let report = evaluate_health(&state, 0, Duration::from_secs(90), 91_000);
        assert_eq!(report.status, "unhealthy");
        assert!(report.alive);
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let state = SupervisorState::new();
        state.beat_at(0);
        let report = evaluate_health(&state, 0, Duration::from_secs(90), 90_000);
        assert!(report.is_healthy());
    }

    #[test]
    fn dead_loop_is_unhealthy_even_when_fresh() {
        let state = SupervisorState::new();
        state.mark_dead();
        let report = evaluate_health(&state, 0, Duration::from_secs(90), state.heartbeat_ms());
        assert!(!report.is_healthy());
        assert!(!report.alive);
    }
}
