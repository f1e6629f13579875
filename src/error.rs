use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatchError>;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The live file no longer matches the digest recorded after the last
    /// patch: something else rewrote it, most likely a game update.
    #[error("'{file}' changed on disk since it was last patched -- was the game updated? \
             Re-run `patch` with --force to discard the stale backups and repatch from the current files")]
    HashMismatch { file: PathBuf },

    #[error("pattern '{pattern}' not found in '{file}' -- unsupported binary variant?")]
    PatternNotFound { file: PathBuf, pattern: String },

    #[error("field '{field}' missing from '{file}' -- document layout changed incompatibly")]
    MissingField { file: PathBuf, field: String },

    #[error("no backup found for '{0}'")]
    BackupMissing(PathBuf),

    #[error("backup for '{0}' already exists")]
    AlreadyBackedUp(PathBuf),

    #[error("{file}:{line}: {message}")]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Soft diagnostic for a binary pattern that matched, but not the expected
/// number of times. The patch still goes through; these are aggregated into
/// the end-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchWarning {
    pub file: PathBuf,
    pub pattern: String,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': pattern '{}' matched {} times, expected {}",
            self.file.display(),
            self.pattern,
            self.found,
            self.expected
        )
    }
}
