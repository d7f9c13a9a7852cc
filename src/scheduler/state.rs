use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;

/// What the life loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Booting,
    Planning,
    Thinking,
    Sleeping,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Booting => "booting",
            Phase::Planning => "planning",
            Phase::Thinking => "thinking",
            Phase::Sleeping => "sleeping",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Planning,
            2 => Phase::Thinking,
            3 => Phase::Sleeping,
            _ => Phase::Booting,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness data written by the life loop and read by the health handler.
///
/// Single writer, many readers: plain atomics, no lock.
#[derive(Debug)]
pub struct SupervisorState {
    epoch: AtomicU64,
    alive: AtomicBool,
    phase: AtomicU8,
    heartbeat_ms: AtomicI64,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorState {
    /// Fresh state: epoch 0, alive, booting, heartbeat now.
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            phase: AtomicU8::new(Phase::Booting as u8),
            heartbeat_ms: AtomicI64::new(now_ms()),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// The life loop is gone; health reports unhealthy from now on.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn beat(&self) {
        self.beat_at(now_ms());
    }

    pub fn beat_at(&self, unix_ms: i64) {
        self.heartbeat_ms.store(unix_ms, Ordering::Release);
    }

    pub fn heartbeat_ms(&self) -> i64 {
        self.heartbeat_ms.load(Ordering::Acquire)
    }

    /// Age of the last heartbeat relative to `now_ms`, clamped at zero.
    pub fn heartbeat_age(&self, now_ms: i64) -> Duration {
        let age = now_ms.saturating_sub(self.heartbeat_ms()).max(0);
        Duration::from_millis(age as u64)
    }
}

/// Current wall clock as unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
