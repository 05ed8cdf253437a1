//! Exclusive advisory lock on the store sentinel file.
//!
//! The lock is held for as long as the guard lives. `flock` locks belong to the
//! open file description, so two guards conflict even inside one process.

use crate::error::{KilnError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub(crate) struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the exclusive lock on `path` is held.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| KilnError::io(path, e))?;

        lock_exclusive(&file, path)?;
        debug!(path = %path.display(), "store lock acquired");

        Ok(Self { file, path: path.to_path_buf() })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    loop {
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(KilnError::io(path, err));
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File, path: &Path) -> Result<()> {
    tracing::warn!(path = %path.display(), "advisory locking unavailable on this platform");
    Ok(())
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        debug!(path = %self.path.display(), "store lock released");
    }
}
