//! Subagent orchestration subsystem.
//!
//! Provides the [`supervisor::SubagentSupervisor`] registry for spawned
//! worker processes, the [`worker`] entry point those processes run, and
//! the shared [`types`] passed between them.

pub mod supervisor;
pub mod types;
pub mod worker;

pub use supervisor::{SubagentSupervisor, WorkerCommand};
pub use types::{TaskInfo, TaskStatus, WorkerSettings, WorkerSpec};
