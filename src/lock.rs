//! Single-instance guard for mutating runs.
//!
//! The lock is an exclusive `flock` on a PID file, held for the life of the
//! guard. The kernel drops it when the holder exits, so a file left behind by
//! a crashed run is simply locked again. The PID inside is informational.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Attempts before giving up when the file keeps being replaced under us
const MAX_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another netwarden run holds {} (pid {})", path.display(), pid.map_or_else(|| "unknown".to_string(), |p| p.to_string()))]
    LockHeld { path: PathBuf, pid: Option<i32> },

    #[error("Lock file error: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Exclusive run lock. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: Flock<File>,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
        }

        for _ in 0..MAX_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| LockError::io(&path, e))?;

            let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => locked,
                Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                    return Err(LockError::LockHeld {
                        pid: read_pid(&path),
                        path,
                    });
                }
                Err((_, errno)) => return Err(LockError::io(&path, io::Error::from(errno))),
            };

            // A releasing holder unlinks the file before unlocking; a lock
            // on an unlinked inode guards nothing.
            if !same_file(&locked, &path).map_err(|e| LockError::io(&path, e))? {
                debug!(path = %path.display(), "Lock file replaced while locking; retrying");
                continue;
            }

            let previous = read_pid(&path);
            if let Some(pid) = previous.filter(|&pid| pid != own_pid()) {
                warn!(path = %path.display(), pid, "Reclaiming lock left by an exited run");
            }

            write_pid(&mut locked).map_err(|e| LockError::io(&path, e))?;
            debug!(path = %path.display(), "Acquired run lock");
            return Ok(Self {
                path,
                _file: locked,
            });
        }

        Err(LockError::LockHeld {
            pid: read_pid(&path),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Unlink while still locked; the flock goes with the file handle
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

fn own_pid() -> i32 {
    std::process::id() as i32
}

fn same_file(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_pid(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{}", own_pid())?;
    file.flush()
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
