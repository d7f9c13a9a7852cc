//! The agent's side of an epoch: prompts, tools, the tool-calling loop and
//! the JSONL journal that records it.

pub mod journal;
pub mod prompt;
pub mod tool_loop;
pub mod tools;
