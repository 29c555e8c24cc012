//! Advisory lock on the store directory.
//!
//! One `lock` file guards every document under the store root. Readers take
//! it shared, writers exclusive. Acquisition polls until the configured
//! timeout and then reports [`LockError::Busy`].

use fs2::FileExt;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ErrorCode;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("{mode} store lock on {} is still held elsewhere after {waited:?}", path.display())]
    Busy {
        path: PathBuf,
        mode: LockMode,
        waited: Duration,
    },

    #[error("store lock file: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Busy { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::StoreWriteFailed,
        }
    }
}

/// A held store lock. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    mode: LockMode,
}

impl StoreLock {
    /// Lock `path` in `mode`, creating the file and its directory if needed.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self, LockError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let contended = fs2::lock_contended_error().raw_os_error();
        let started = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(Self { file, mode }),
                Err(err) if err.raw_os_error() != contended => return Err(err.into()),
                Err(_) if started.elapsed() >= timeout => {
                    return Err(LockError::Busy {
                        path: path.to_path_buf(),
                        mode,
                        waited: started.elapsed(),
                    });
                }
                Err(_) => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::debug!(error = %err, mode = %self.mode, "store lock release failed");
        }
    }
}
