/// Status file: the monitor's latest snapshot as JSON, rewritten on every
/// transition so `torguard --status` can report on a running instance.
///
/// Uses atomic write pattern: write to temp file then rename.
use crate::monitor::StatusSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord<'a> {
    pub pid: u32,
    #[serde(flatten)]
    pub snapshot: &'a StatusSnapshot,
    pub last_update: DateTime<Utc>,
}

impl<'a> StatusRecord<'a> {
    pub fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self {
            pid: std::process::id(),
            snapshot,
            last_update: Utc::now(),
        }
    }
}

/// Manages the status file lifecycle.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write a record.
    ///
    /// Writes to a temporary file in the same directory, then renames
    /// to ensure readers never see a partial write.
    pub fn write(&self, record: &StatusRecord<'_>) -> Result<(), StatusError> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".torguard.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Read back whatever a (possibly other) process last wrote.
    pub fn read(&self) -> Result<serde_json::Value, StatusError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| StatusError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| StatusError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Errors from status file operations.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => write!(f, "failed to serialize status: {source}"),
            StatusError::Write { path, source } => {
                write!(
                    f,
                    "failed to write temp status file {}: {source}",
                    path.display()
                )
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
            StatusError::Read { path, source } => {
                write!(f, "failed to read status file {}: {source}", path.display())
            }
            StatusError::Parse { path, source } => {
                write!(f, "invalid status file {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
            StatusError::Read { source, .. } => Some(source),
            StatusError::Parse { source, .. } => Some(source),
        }
    }
}
