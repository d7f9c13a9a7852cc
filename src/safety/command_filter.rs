use regex::RegexSet;

/// Checks commands against a set of denylisted substrings.
pub struct CommandFilter {
    patterns: RegexSet,
    pattern_reasons: Vec<String>,
}

/// Information about a blocked command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlockedCommand {
    pub blocked: bool,
    pub substring: String,
    pub reason: String,
    pub command: String,
}

impl CommandFilter {
    /// Create a new filter from a list of (substring, reason) tuples.
    /// Substrings are escaped and compiled once into a single RegexSet.
    pub fn new(denylist: &[(String, String)]) -> Result<Self, regex::Error> {
        let (substrings, reasons): (Vec<_>, Vec<_>) = denylist
            .iter()
            .filter(|(substring, _)| !substring.is_empty())
            .map(|(substring, reason)| (regex::escape(substring), reason.clone()))
            .unzip();
        Ok(Self {
            patterns: RegexSet::new(&substrings)?,
            pattern_reasons: reasons,
        })
    }

    pub fn from_defaults() -> Result<Self, regex::Error> {
        Self::new(&super::defaults::default_denylist())
    }

    /// Check if a command is blocked. Returns Some(BlockedCommand) if blocked, None if allowed.
    pub fn check(&self, command: &str) -> Option<BlockedCommand> {
        let first = self.patterns.matches(command).into_iter().next()?;
        Some(BlockedCommand {
            blocked: true,
            substring: unescape_literal(&self.patterns.patterns()[first]),
            reason: self.pattern_reasons[first].clone(),
            command: command.to_string(),
        })
    }

    /// Number of active denylist entries.
    pub fn len(&self) -> usize {
        self.pattern_reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern_reasons.is_empty()
    }
}

impl BlockedCommand {
    /// The tool result shown to the agent.
    pub fn to_tool_message(&self) -> String {
        format!(
            "ERROR: Command blocked ({}): contains denied substring '{}'",
            self.reason, self.substring
        )
    }
}

// Reverses `regex::escape` for display.
fn unescape_literal(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
