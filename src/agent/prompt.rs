//! Prompt text for each phase of an epoch.

use crate::kernel::{ChatMessage, Genesis};
use crate::mailbox::InboxMessage;

/// File in the brain the agent maintains for its own standing instructions.
pub const NOTES_FILE: &str = "NOTES.md";

pub const PLAN_INSTRUCTIONS: &str = "\
Before acting, make a plan for this epoch. You may use read and execute to \
inspect your brain directory and running processes, but do not change anything yet.

Reply with a short numbered list of the concrete steps you will take this epoch, \
most important first. Answer human messages before anything else.";

pub const EXECUTE_INSTRUCTION: &str = "Good plan. Now execute it. Use your tools.";

pub const FALLBACK_PLAN: &str = "1. Check on human messages and respond if needed.\n\
2. Ensure my app is healthy.\n\
3. Make one small improvement.";

pub const BIRTH_PLAN_MARKER: &str = "(birth, no planning phase)";

/// System preamble for a subagent worker.
pub fn subagent_preamble(task_id: &str) -> String {
    format!(
        "You are a subagent working on task '{task_id}'. Complete the task and provide a summary of what you did."
    )
}

/// The very first prompt, at epoch 0.
pub fn birth_prompt(genesis: &Genesis) -> String {
    format!(
        "You are {name}. You have just been born.

PURPOSE:
{purpose}

You live in a brain directory that is yours to shape. You have tools to read \
and write files, run shell commands, and spawn subagents for parallel work. \
You wake up on a fixed cadence; between wake-ups you sleep.

For this first wake-up:
1. Look around your brain directory.
2. Write {notes} with your priorities, habits and goals. It is shown to you every time you wake.
3. Build the smallest working version of your app and start it with nohup so it survives between wake-ups.

When you are done, reply with a short summary of what you did.",
        name = genesis.name(),
        purpose = genesis.purpose,
        notes = NOTES_FILE,
    )
}

/// Everything the agent is told about its situation when it wakes.
#[derive(Debug, Clone, Default)]
pub struct Situation {
    pub epoch: u64,
    pub genesis: Genesis,
    pub notes: String,
    pub budget: String,
    pub recent_actions: String,
    pub subagents: String,
    pub inbox: Vec<InboxMessage>,
    pub chat: Vec<ChatMessage>,
    pub files: String,
    pub processes: String,
    pub history: String,
    pub memories: String,
}

fn format_inbox(messages: &[InboxMessage]) -> (String, String) {
    let (results, system): (Vec<_>, Vec<_>) = messages.iter().partition(|m| m.is_from_subagent());
    let render = |items: Vec<&InboxMessage>| {
        items
            .iter()
            .map(|m| format!("[{}] {}", m.source, m.message))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let system = if system.is_empty() {
        "(no system messages)".to_string()
    } else {
        render(system)
    };
    let results = if results.is_empty() {
        "(no subagent results)".to_string()
    } else {
        render(results)
    };
    (system, results)
}

fn format_chat(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "(no new messages)".to_string();
    }
    messages
        .iter()
        .map(|m| format!("[{}] {}", m.source, m.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The situational prompt for every epoch after birth.
pub fn wakeup_prompt(s: &Situation) -> String {
    let (system_inbox, subagent_results) = format_inbox(&s.inbox);
    format!(
        "You are {name}. You just woke up. This is epoch {epoch}.

PURPOSE:
{purpose}

YOUR NOTES ({notes_file}):
{notes}

BUDGET:
{budget}

WHAT YOU DID LAST TIME:
{actions}

SUBAGENTS:
{subagents}

SYSTEM INBOX:
{system_inbox}

SUBAGENT RESULTS:
{subagent_results}

HUMAN MESSAGES:
{chat}

FILES IN YOUR BRAIN DIRECTORY:
{files}

RUNNING PROCESSES:
{processes}

RECENT GIT HISTORY:
{history}

RECENT MEMORIES:
{memories}",
        name = s.genesis.name(),
        epoch = s.epoch,
        purpose = s.genesis.purpose,
        notes_file = NOTES_FILE,
        notes = s.notes,
        budget = s.budget,
        actions = s.recent_actions,
        subagents = s.subagents,
        system_inbox = system_inbox,
        subagent_results = subagent_results,
        chat = format_chat(&s.chat),
        files = s.files,
        processes = s.processes,
        history = s.history,
        memories = s.memories,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_splits_subagent_results_from_system_messages() {
        let situation = Situation {
            inbox: vec![
                InboxMessage {
                    message: "disk almost full".into(),
                    source: "kernel".into(),
                },
                InboxMessage {
                    message: "css fixed".into(),
                    source: "subagent:fix-css".into(),
                },
            ],
            ..Default::default()
        };
        let prompt = wakeup_prompt(&situation);
        let system_at = prompt.find("SYSTEM INBOX:\n[kernel] disk almost full").unwrap();
        let results_at = prompt
            .find("SUBAGENT RESULTS:\n[subagent:fix-css] css fixed")
            .unwrap();
        assert!(system_at < results_at);
        assert!(prompt.contains("HUMAN MESSAGES:\n(no new messages)"));
    }

    #[test]
    fn birth_prompt_names_the_agent() {
        let prompt = birth_prompt(&Genesis::fallback());
        assert!(prompt.starts_with("You are Agent."));
        assert!(prompt.contains(NOTES_FILE));
    }

    #[test]
    fn subagent_preamble_names_task() {
        assert_eq!(
            subagent_preamble("t1"),
            "You are a subagent working on task 't1'. Complete the task and provide a summary of what you did."
        );
    }
}
