use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Persists the epoch counter as a single decimal number in one file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a reader only ever sees a complete old or a complete new value.
#[derive(Debug, Clone)]
pub struct EpochStore {
    path: PathBuf,
}

impl EpochStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted counter. Missing or unparsable reads as 0.
    pub fn load(&self) -> u64 {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(epoch) => epoch,
                Err(_) => {
                    warn!(
                        "Epoch file {} is unparsable ({:?}); treating as 0",
                        self.path.display(),
                        text.trim()
                    );
                    0
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("Could not read epoch file {}: {}", self.path.display(), e);
                0
            }
        }
    }

    pub fn save(&self, epoch: u64) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            write!(file, "{epoch}")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
    }
}

/// How this process came to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootKind {
    /// No prior state: epoch 0.
    Birth,
    /// A persisted counter above zero.
    Resumed(u64),
    /// No counter, but the brain predates it.
    Legacy,
}

impl BootKind {
    /// Resolve the boot kind from the persisted counter and whether the
    /// legacy marker file exists in the brain.
    pub fn resolve(persisted: u64, legacy_marker_exists: bool) -> Self {
        if persisted > 0 {
            BootKind::Resumed(persisted)
        } else if legacy_marker_exists {
            BootKind::Legacy
        } else {
            BootKind::Birth
        }
    }

    /// The epoch the life loop starts at.
    pub fn starting_epoch(self) -> u64 {
        match self {
            BootKind::Birth => 0,
            BootKind::Resumed(epoch) => epoch,
            BootKind::Legacy => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_kind_resolution() {
        assert_eq!(BootKind::resolve(0, false), BootKind::Birth);
        assert_eq!(BootKind::resolve(0, true), BootKind::Legacy);
        assert_eq!(BootKind::resolve(5, true), BootKind::Resumed(5));
        assert_eq!(BootKind::Legacy.starting_epoch(), 1);
        assert_eq!(BootKind::Resumed(9).starting_epoch(), 9);
    }
}
