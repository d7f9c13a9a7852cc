//! Bounded think → act → feed back protocol.
//!
//! Each round sends the conversation to the kernel. A response without tool
//! calls (or flagged `done`) ends the loop; otherwise every requested call is
//! executed in order, its result appended as a `tool_result` turn, and the
//! loop goes around again, up to `max_rounds`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::journal::{now_iso, Journal, JournalEntry};
use super::tools::{is_error, ToolExecutor, Toolset};
use crate::kernel::{Kernel, KernelLog, Message, ThinkRequest, MAX_TOKENS};
use crate::orchestration::types::excerpt;

pub const PRIMARY_MAX_ROUNDS: usize = 50;
pub const SUBAGENT_MAX_ROUNDS: usize = 30;

pub const UNREACHABLE_TEXT: &str = "I couldn't reach the kernel to think.";
pub const LOOP_LIMIT_TEXT: &str = "I hit my tool loop limit. Pausing to avoid runaway.";

/// Characters of a tool result kept in an [`ActionRecord`].
const RESULT_EXCERPT_CHARS: usize = 200;
/// Characters of tool arguments shown in log lines.
const ARGS_LOG_CHARS: usize = 100;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEnd {
    Finished,
    Unreachable,
    LoopLimit,
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub tool: String,
    pub arguments: Value,
    /// First 200 characters of the result.
    pub result: String,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub content: String,
    pub actions: Vec<ActionRecord>,
    pub end: LoopEnd,
    pub rounds: usize,
}

/// Per-run inputs besides the conversation itself.
#[derive(Debug, Clone)]
pub struct LoopParams {
    pub system: Option<String>,
    pub intent: String,
    pub toolset: Toolset,
    pub requested_by: Option<String>,
}

impl LoopParams {
    pub fn new(intent: impl Into<String>, toolset: Toolset) -> Self {
        Self {
            system: None,
            intent: intent.into(),
            toolset,
            requested_by: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn requested_by(mut self, who: impl Into<String>) -> Self {
        self.requested_by = Some(who.into());
        self
    }
}

pub struct ToolLoop {
    kernel: Arc<dyn Kernel>,
    tools: Arc<ToolExecutor>,
    journal: Option<Arc<Journal>>,
    log: Option<KernelLog>,
    max_rounds: usize,
}

impl ToolLoop {
    pub fn new(kernel: Arc<dyn Kernel>, tools: Arc<ToolExecutor>) -> Self {
        Self {
            kernel,
            tools,
            journal: None,
            log: None,
            max_rounds: PRIMARY_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Mirror tool-call log lines to the kernel.
    pub fn with_log(mut self, log: KernelLog) -> Self {
        self.log = Some(log);
        self
    }

    fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(&entry);
        }
    }

    async fn log_line(&self, line: String) {
        match &self.log {
            Some(log) => log.line(line).await,
            None => tracing::info!("{}", line),
        }
    }

    /// Run the loop to completion over `conversation`.
    pub async fn run(&self, conversation: Vec<Message>, params: &LoopParams) -> LoopOutcome {
        let mut request = ThinkRequest {
            intent: params.intent.clone(),
            messages: conversation,
            tools: self.tools.definitions(params.toolset),
            max_tokens: MAX_TOKENS,
            system: params.system.clone(),
            requested_by: params.requested_by.clone(),
        };
        let mut actions = Vec::new();

        for round in 1..=self.max_rounds {
            self.record(JournalEntry::Think {
                timestamp: now_iso(),
                round,
                intent: request.intent.clone(),
                messages: request.messages.len(),
            });

            let response = match self.kernel.think(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(round, "Think failed: {}", e);
                    return self.finish(UNREACHABLE_TEXT.to_string(), actions, LoopEnd::Unreachable, round);
                }
            };

            if !response.content.is_empty() {
                self.record(JournalEntry::AssistantText {
                    timestamp: now_iso(),
                    round,
                    content: response.content.clone(),
                });
            }

            if response.tool_calls.is_empty() || response.done {
                return self.finish(response.content, actions, LoopEnd::Finished, round);
            }

            debug!(round, calls = response.tool_calls.len(), "Executing tool calls");
            let calls = response.tool_calls.clone();
            request.messages.push(Message::Assistant {
                content: response.content,
                tool_calls: response.tool_calls,
            });

            for call in calls {
                let arguments = Value::Object(call.arguments.clone());
                let shown = excerpt(&arguments.to_string(), ARGS_LOG_CHARS);
                self.log_line(format!("  tool: {}({})", call.name, shown)).await;
                self.record(JournalEntry::ToolCall {
                    timestamp: now_iso(),
                    round,
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: arguments.clone(),
                });

                let result = self
                    .tools
                    .execute(params.toolset, &call.name, &call.arguments)
                    .await;
                let failed = is_error(&result);

                self.record(JournalEntry::ToolResult {
                    timestamp: now_iso(),
                    round,
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    result: result.clone(),
                    is_error: failed,
                });
                actions.push(ActionRecord {
                    tool: call.name,
                    arguments,
                    result: excerpt(&result, RESULT_EXCERPT_CHARS),
                });
                request.messages.push(Message::ToolResult {
                    tool_call_id: call.id,
                    content: result,
                    is_error: failed,
                });
            }
        }

        warn!(rounds = self.max_rounds, "Tool loop limit reached");
        self.finish(LOOP_LIMIT_TEXT.to_string(), actions, LoopEnd::LoopLimit, self.max_rounds)
    }

    fn finish(
        &self,
        content: String,
        actions: Vec<ActionRecord>,
        end: LoopEnd,
        rounds: usize,
    ) -> LoopOutcome {
        self.record(JournalEntry::LoopEnd {
            timestamp: now_iso(),
            rounds,
            reason: format!("{end:?}"),
            actions: actions.len(),
        });
        LoopOutcome {
            content,
            actions,
            end,
            rounds,
        }
    }
}
