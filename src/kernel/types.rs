//! Wire types for the kernel API.
//!
//! Field names follow the kernel's JSON exactly; the kernel calls an epoch a
//! "galla", so epoch-carrying fields are renamed on the way out.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One entry of the conversation sent to `think`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A tool invocation requested by the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: Map<String, Value>,
}

/// JSON-schema description of a tool, as advertised to the kernel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThinkRequest {
    pub intent: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThinkResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default = "default_done")]
    pub done: bool,
}

impl ThinkResponse {
    /// A final answer with no tool calls.
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            done: true,
        }
    }

    /// A turn that requests tools and expects to continue.
    pub fn calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            done: false,
        }
    }
}

fn default_done() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub name: String,
}

/// The agent's founding document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub purpose: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Genesis {
    /// Identity used when the kernel cannot supply one.
    pub fn fallback() -> Self {
        Self {
            identity: Identity {
                name: "Agent".to_string(),
            },
            purpose: "You are an autonomous agent. Keep your app healthy and improve it.".to_string(),
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        if self.identity.name.is_empty() {
            "Agent"
        } else {
            &self.identity.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: i64,
    #[serde(default = "unknown_source")]
    pub source: String,
    #[serde(default)]
    pub message: String,
}

fn unknown_source() -> String {
    "?".to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatList {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitList {
    #[serde(default)]
    pub commits: Vec<CommitInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemoryList {
    #[serde(default)]
    pub memories: Vec<Memory>,
}

/// A timeline entry for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    #[serde(rename = "galla")]
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EpochList {
    #[serde(default)]
    pub gallas: Vec<EpochReport>,
}

/// Fire-and-forget updates pushed to the kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Log {
        event: String,
        message: String,
        epoch: u64,
    },
    Memory {
        content: String,
        tags: Vec<String>,
        source: String,
    },
    Commit {
        message: String,
    },
    Heartbeat {
        phase: String,
        epoch: u64,
        active_agents: usize,
    },
    Epoch(EpochReport),
    ChatAck {
        up_to_id: i64,
    },
}

impl Notice {
    /// API path this notice is posted to.
    pub fn path(&self) -> &'static str {
        match self {
            Notice::Log { .. } => "/api/log",
            Notice::Memory { .. } => "/api/memory/store",
            Notice::Commit { .. } => "/api/commit",
            Notice::Heartbeat { .. } => "/api/heartbeat",
            Notice::Epoch(_) => "/api/galla",
            Notice::ChatAck { .. } => "/api/chat/ack",
        }
    }

    /// JSON body for the notice.
    pub fn body(&self) -> Value {
        match self {
            Notice::Log {
                event,
                message,
                epoch,
            } => serde_json::json!({ "event": event, "message": message, "galla": epoch }),
            Notice::Memory {
                content,
                tags,
                source,
            } => serde_json::json!({ "content": content, "tags": tags, "source": source }),
            Notice::Commit { message } => serde_json::json!({ "message": message }),
            Notice::Heartbeat {
                phase,
                epoch,
                active_agents,
            } => serde_json::json!({ "phase": phase, "galla": epoch, "active_agents": active_agents }),
            Notice::Epoch(report) => serde_json::to_value(report).unwrap_or(Value::Null),
            Notice::ChatAck { up_to_id } => serde_json::json!({ "up_to_id": up_to_id }),
        }
    }

    /// Log and heartbeat traffic is high-volume; its failures are not worth a warning.
    pub fn is_chatter(&self) -> bool {
        matches!(self, Notice::Log { .. } | Notice::Heartbeat { .. })
    }
}
