//! Advisory lock giving one scan exclusive use of a checkpoint.
//!
//! The lock is a `<checkpoint>.lock` file holding the owner's pid, created
//! with `create_new`. A lock whose pid is no longer running is stale and is
//! taken over. A lock without a readable pid may belong to an owner that has
//! not finished writing it, so it is treated as held.

use crate::error::{Result, ScanError};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const UNREADABLE_WAIT: Duration = Duration::from_millis(200);
const RETRY_DELAY: Duration = Duration::from_millis(20);

/// Held lock. Removes the lock file on drop.
#[derive(Debug)]
pub struct CheckpointLock {
    path: PathBuf,
}

impl CheckpointLock {
    /// Lock file path for a checkpoint.
    #[must_use]
    pub fn lock_path(checkpoint: &Path) -> PathBuf {
        let mut path = checkpoint.as_os_str().to_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Take the lock for `checkpoint`, failing fast if a live process holds it.
    pub fn acquire(checkpoint: &Path) -> Result<Self> {
        let lock_path = Self::lock_path(checkpoint);
        let started = Instant::now();
        let mut stale_removed = false;

        loop {
            match try_acquire(&lock_path)? {
                LockState::Acquired(lock) => return Ok(lock),
                LockState::HeldBy(pid) => {
                    return Err(ScanError::CheckpointLocked {
                        path: checkpoint.to_path_buf(),
                        pid,
                    })
                }
                LockState::Stale(pid) if !stale_removed => {
                    tracing::warn!(path = %lock_path.display(), pid, "removing stale checkpoint lock");
                    std::fs::remove_file(&lock_path)?;
                    stale_removed = true;
                }
                LockState::Stale(_) => break,
                LockState::Unknown => {
                    if started.elapsed() >= UNREADABLE_WAIT {
                        tracing::warn!(path = %lock_path.display(), "checkpoint lock has no readable owner");
                        return Err(ScanError::LockUnreadable { path: lock_path });
                    }
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }

        Err(ScanError::InvalidState(format!(
            "could not acquire checkpoint lock at {}",
            lock_path.display()
        )))
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug)]
enum LockState {
    Acquired(CheckpointLock),
    HeldBy(u32),
    Stale(u32),
    Unknown,
}

fn try_acquire(lock_path: &Path) -> Result<LockState> {
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().create_new(true).write(true).open(lock_path) {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            Ok(LockState::Acquired(CheckpointLock {
                path: lock_path.to_path_buf(),
            }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let mut pid_buf = String::new();
            let read = OpenOptions::new()
                .read(true)
                .open(lock_path)
                .and_then(|mut file| file.read_to_string(&mut pid_buf));
            match read {
                Ok(_) => {}
                // Released between the create and the read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LockState::Unknown),
                Err(e) => return Err(e.into()),
            }

            match pid_buf.trim().parse::<u32>() {
                Ok(pid) if is_process_running(pid) => Ok(LockState::HeldBy(pid)),
                Ok(pid) => Ok(LockState::Stale(pid)),
                Err(_) => Ok(LockState::Unknown),
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
