use std::path::{Component, Path, PathBuf};

/// Enforces brain-scoped write access.
/// Reads are unrestricted; writes must target paths within the brain directory.
pub struct WorkspaceGuard {
    /// Canonical (absolute, symlinks resolved) brain root.
    canonical_root: PathBuf,
}

impl WorkspaceGuard {
    /// Create a new guard for the given brain path.
    /// Creates the directory if it doesn't exist and resolves to canonical path.
    pub fn new(brain: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(brain)?;
        let canonical_root = std::fs::canonicalize(brain)?;
        Ok(Self { canonical_root })
    }

    /// Resolve a path given by the agent against the brain root.
    /// Absolute paths are kept as-is.
    pub fn resolve(&self, target: &str) -> PathBuf {
        self.canonical_root.join(target)
    }

    /// Check if a write to the given path is allowed.
    ///
    /// `..` components are folded lexically, then the nearest existing
    /// ancestor is canonicalized so a symlink cannot lead outside the root.
    pub fn is_write_allowed(&self, target: &Path) -> Result<bool, std::io::Error> {
        let normalized = normalize(&self.canonical_root.join(target));
        if !normalized.starts_with(&self.canonical_root) {
            return Ok(false);
        }

        let mut existing = normalized.as_path();
        while !existing.exists() {
            existing = match existing.parent() {
                Some(parent) => parent,
                None => return Ok(false),
            };
        }
        let canonical = std::fs::canonicalize(existing)?;
        Ok(canonical.starts_with(&self.canonical_root))
    }

    /// Get the canonical brain root path.
    pub fn canonical_root(&self) -> &Path {
        &self.canonical_root
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
