/// Single-instance guard: an exclusive `fs2` advisory lock held for the
/// process lifetime, with the holder's pid written into the lock file.
///
/// Two monitors would race each other for the consent prompt and the
/// kill-switch, so a second instance refuses to start.
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct InstanceLock {
    // Lock is released when the file is closed
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock at `path`, creating the file and its directory.
    pub fn acquire(path: &Path) -> Result<InstanceLock, LockError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        // No truncation before the lock is ours, or the holder's pid is lost
        #[allow(clippy::suspicious_open_options)]
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                let mut contents = String::new();
                let _ = file.read_to_string(&mut contents);
                return Err(LockError::AlreadyRunning {
                    path: path.to_path_buf(),
                    pid: contents.trim().parse().ok(),
                });
            }
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }

        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .and_then(|_| file.flush())
            .map_err(|e| LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        tracing::debug!(path = %path.display(), "instance lock acquired");
        Ok(InstanceLock {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub enum LockError {
    AlreadyRunning { path: PathBuf, pid: Option<u32> },
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::AlreadyRunning {
                path,
                pid: Some(pid),
            } => write!(
                f,
                "another torguard instance (pid {pid}) holds {}",
                path.display()
            ),
            LockError::AlreadyRunning { path, pid: None } => {
                write!(f, "another torguard instance holds {}", path.display())
            }
            LockError::Io { path, source } => {
                write!(f, "failed to lock {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Io { source, .. } => Some(source),
            LockError::AlreadyRunning { .. } => None,
        }
    }
}
