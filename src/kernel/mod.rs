//! Client side of the kernel API: the reasoning call plus the best-effort
//! bookkeeping endpoints the supervisor reports to.

pub mod http;
pub mod log;
pub mod types;

#[cfg(test)]
pub mod scripted;

pub use http::HttpKernel;
pub use log::KernelLog;
pub use types::*;

use async_trait::async_trait;

use crate::error::KernelError;

/// Upper bound on tokens requested from a single `think` call.
pub const MAX_TOKENS: u32 = 8000;

/// The narrow contract the supervisor needs from the kernel.
///
/// `think` is the only call whose failure changes control flow. Everything
/// else is either a query the caller degrades to a placeholder on error, or a
/// [`Notice`] whose delivery failure is logged and forgotten.
#[async_trait]
pub trait Kernel: Send + Sync {
    async fn think(&self, request: &ThinkRequest) -> Result<ThinkResponse, KernelError>;

    /// Best-effort delivery of a notice. Never fails.
    async fn notify(&self, notice: Notice);

    /// Whether the kernel answers its status endpoint with 200.
    async fn ping(&self) -> bool;

    async fn genesis(&self) -> Result<Genesis, KernelError>;

    async fn budget(&self) -> Result<serde_json::Value, KernelError>;

    async fn unread_chat(&self) -> Result<Vec<ChatMessage>, KernelError>;

    async fn history(&self) -> Result<Vec<CommitInfo>, KernelError>;

    async fn memories(&self, limit: usize) -> Result<Vec<Memory>, KernelError>;

    async fn epoch_records(&self) -> Result<Vec<EpochReport>, KernelError>;

    async fn request_restart(&self) -> Result<(), KernelError>;
}
