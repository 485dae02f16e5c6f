//! Advisory locks shared by every handle on one queue directory
//!
//! The in-process mutexes in [`DurableQueue`](super::DurableQueue) only cover
//! handles that share memory. Separate processes (two CLI runs, say) meet
//! here instead, through `flock` on a lock file inside the queue directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Guards key minting, commits and temp-file cleanup
pub(crate) const WRITE_LOCK: &str = ".write.lock";

/// Guards drain passes
pub(crate) const DRAIN_LOCK: &str = ".drain.lock";

/// Exclusive lock, released when dropped
#[derive(Debug)]
pub(crate) struct DirLock {
    _file: File,
}

impl DirLock {
    /// Wait until the lock at `path` is ours
    pub(crate) async fn acquire(path: PathBuf) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            flock_exclusive(&file, false)?;
            Ok(Self { _file: file })
        })
        .await
        .map_err(io::Error::other)?
    }

    /// `Ok(None)` if another handle holds the lock
    pub(crate) async fn try_acquire(path: PathBuf) -> io::Result<Option<Self>> {
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            let acquired = flock_exclusive(&file, true)?;
            Ok(acquired.then(|| Self { _file: file }))
        })
        .await
        .map_err(io::Error::other)?
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).write(true).open(path)
}

/// Returns `Ok(false)` only for a non-blocking attempt that found the lock taken
#[cfg(unix)]
fn flock_exclusive(file: &File, nonblocking: bool) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut op = libc::LOCK_EX;
    if nonblocking {
        op |= libc::LOCK_NB;
    }
    loop {
        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::Interrupted => continue,
            io::ErrorKind::WouldBlock => return Ok(false),
            _ => return Err(err),
        }
    }
}

#[cfg(not(unix))]
fn flock_exclusive(_file: &File, _nonblocking: bool) -> io::Result<bool> {
    Ok(true)
}
