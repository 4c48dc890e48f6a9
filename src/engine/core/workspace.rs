//! Per-invocation working directory.
//!
//! Every intermediate file (audio renders, the segment intermediate, two-pass
//! statistics, the debug transcript) lives under `<root>/clipfit-<id>`, where
//! `<id>` comes from an injected [`IdGenerator`]. Concurrent runs sharing a
//! root never collide.

use super::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of unique working-directory names
pub trait IdGenerator {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

const CREATE_ATTEMPTS: usize = 8;

/// File name of the debug transcript inside the working directory
pub const DEBUG_LOG_NAME: &str = "clipfit.log";

/// Working directory removed on drop unless kept
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    keep: bool,
}

impl Workspace {
    /// Create a fresh directory under `root`. An id that is already taken
    /// is skipped.
    pub fn create(root: &Path, ids: &dyn IdGenerator) -> Result<Self> {
        fs::create_dir_all(root)?;

        let mut last_err = None;
        for _ in 0..CREATE_ATTEMPTS {
            let dir = root.join(format!("clipfit-{}", ids.next_id()));
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "created working directory");
                    return Ok(Self {
                        dir,
                        artifacts: Vec::new(),
                        keep: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| std::io::Error::other("no working directory id available"))
            .into())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a named intermediate file; recorded for the caller
    pub fn artifact(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path.clone());
        }
        path
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(DEBUG_LOG_NAME)
    }

    /// Leave the directory on disk after drop
    pub fn keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        // Best effort: a failed removal must not mask the pipeline result
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != ErrorKind::NotFound {
                debug!(dir = %self.dir.display(), error = %e, "failed to remove working directory");
            }
        }
    }
}
