use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::*;
use super::Kernel;
use crate::error::KernelError;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const CONTEXT_TIMEOUT: Duration = Duration::from_secs(5);
const STORE_TIMEOUT: Duration = Duration::from_secs(30);
const CHATTER_TIMEOUT: Duration = Duration::from_secs(2);

/// [`Kernel`] over HTTP. System proxies are bypassed; the kernel is always
/// reached directly.
pub struct HttpKernel {
    base_url: String,
    think_timeout: Duration,
    client: reqwest::Client,
}

impl HttpKernel {
    pub fn new(base_url: impl Into<String>, think_timeout: Duration) -> Result<Self, KernelError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| KernelError::Transport {
                path: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            think_timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, KernelError> {
        let response = self
            .client
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        decode(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, KernelError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        decode(path, response).await
    }

    async fn post_ignoring_body<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(), KernelError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        check_status(path, &response)
    }
}

fn transport(path: &str, e: reqwest::Error) -> KernelError {
    KernelError::Transport {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn check_status(path: &str, response: &reqwest::Response) -> Result<(), KernelError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(KernelError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        })
    }
}

async fn decode<T: DeserializeOwned>(
    path: &str,
    response: reqwest::Response,
) -> Result<T, KernelError> {
    check_status(path, &response)?;
    response.json::<T>().await.map_err(|e| KernelError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn notice_timeout(notice: &Notice) -> Duration {
    match notice {
        Notice::Log { .. } | Notice::Heartbeat { .. } => CHATTER_TIMEOUT,
        Notice::Memory { .. } | Notice::Commit { .. } => STORE_TIMEOUT,
        Notice::Epoch(_) | Notice::ChatAck { .. } => QUERY_TIMEOUT,
    }
}

#[async_trait]
impl Kernel for HttpKernel {
    async fn think(&self, request: &ThinkRequest) -> Result<ThinkResponse, KernelError> {
        debug!(
            intent = %request.intent,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "think"
        );
        self.post_json("/api/think", request, self.think_timeout).await
    }

    async fn notify(&self, notice: Notice) {
        let path = notice.path();
        let result = self
            .post_ignoring_body(path, &notice.body(), notice_timeout(&notice))
            .await;
        if let Err(e) = result {
            if notice.is_chatter() {
                debug!("{}", e);
            } else {
                warn!("{}", e);
            }
        }
    }

    async fn ping(&self) -> bool {
        match self
            .client
            .get(self.url("/api/status"))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }

    async fn genesis(&self) -> Result<Genesis, KernelError> {
        self.get_json("/api/genesis", QUERY_TIMEOUT).await
    }

    async fn budget(&self) -> Result<serde_json::Value, KernelError> {
        self.get_json("/api/budget", QUERY_TIMEOUT).await
    }

    async fn unread_chat(&self) -> Result<Vec<ChatMessage>, KernelError> {
        let list: ChatList = self
            .get_json("/api/chat?unread=true&source=human", QUERY_TIMEOUT)
            .await?;
        Ok(list.messages)
    }

    async fn history(&self) -> Result<Vec<CommitInfo>, KernelError> {
        let list: CommitList = self.get_json("/api/history", CONTEXT_TIMEOUT).await?;
        Ok(list.commits)
    }

    async fn memories(&self, limit: usize) -> Result<Vec<Memory>, KernelError> {
        let path = format!("/api/memories?limit={limit}");
        let list: MemoryList = self.get_json(&path, CONTEXT_TIMEOUT).await?;
        Ok(list.memories)
    }

    async fn epoch_records(&self) -> Result<Vec<EpochReport>, KernelError> {
        let list: EpochList = self.get_json("/api/galla?limit=1000", QUERY_TIMEOUT).await?;
        Ok(list.gallas)
    }

    async fn request_restart(&self) -> Result<(), KernelError> {
        self.post_ignoring_body("/api/restart", &serde_json::json!({}), QUERY_TIMEOUT)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_kernel() -> HttpKernel {
        // Port 9 (discard) on localhost is closed in test environments.
        HttpKernel::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(unreachable_kernel().base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn unreachable_kernel_reports_transport_errors() {
        let kernel = unreachable_kernel();
        assert!(!kernel.ping().await);
        let err = kernel.genesis().await.unwrap_err();
        assert!(matches!(err, KernelError::Transport { .. }));
        // notify swallows the failure
        kernel
            .notify(Notice::Commit {
                message: "x".into(),
            })
            .await;
    }
}
