//! In-memory [`Kernel`] that replays scripted `think` responses and records
//! everything it is sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::*;
use super::Kernel;
use crate::error::KernelError;

#[derive(Default)]
pub struct ScriptedKernel {
    script: Mutex<VecDeque<Result<ThinkResponse, KernelError>>>,
    /// Returned once the script runs out. `None` means "unreachable".
    repeat: Option<ThinkResponse>,
    panic_on_think: bool,
    pub chat: Mutex<Vec<ChatMessage>>,
    pub records: Mutex<Vec<EpochReport>>,
    pub requests: Mutex<Vec<ThinkRequest>>,
    pub notices: Mutex<Vec<Notice>>,
}

impl ScriptedKernel {
    pub fn new(script: Vec<Result<ThinkResponse, KernelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// A kernel that answers every `think` with the same response.
    pub fn repeating(response: ThinkResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_think: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<ThinkRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn epoch_reports(&self) -> Vec<EpochReport> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Epoch(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

pub fn down(path: &str) -> KernelError {
    KernelError::Transport {
        path: path.to_string(),
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl Kernel for ScriptedKernel {
    async fn think(&self, request: &ThinkRequest) -> Result<ThinkResponse, KernelError> {
        if self.panic_on_think {
            panic!("scripted kernel panic");
        }
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(next) => next,
            None => self.repeat.clone().ok_or_else(|| down("/api/think")),
        }
    }

    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn genesis(&self) -> Result<Genesis, KernelError> {
        Err(down("/api/genesis"))
    }

    async fn budget(&self) -> Result<serde_json::Value, KernelError> {
        Ok(serde_json::json!({ "remaining": 10.0 }))
    }

    async fn unread_chat(&self) -> Result<Vec<ChatMessage>, KernelError> {
        Ok(std::mem::take(&mut *self.chat.lock().unwrap()))
    }

    async fn history(&self) -> Result<Vec<CommitInfo>, KernelError> {
        Ok(Vec::new())
    }

    async fn memories(&self, _limit: usize) -> Result<Vec<Memory>, KernelError> {
        Ok(Vec::new())
    }

    async fn epoch_records(&self) -> Result<Vec<EpochReport>, KernelError> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn request_restart(&self) -> Result<(), KernelError> {
        Ok(())
    }
}
