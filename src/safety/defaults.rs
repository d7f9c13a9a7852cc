/// Returns the default denylist of (substring, reason) tuples.
///
/// Entries are matched literally and case-sensitively anywhere in the command
/// string. The list keeps the agent away from the supervisor's own executable
/// and configuration; it is not a sandbox.
pub fn default_denylist() -> Vec<(String, String)> {
    vec![(
        "vigil".into(),
        "Commands touching the supervisor are not allowed".into(),
    )]
}
