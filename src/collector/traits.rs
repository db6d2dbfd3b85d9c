//! Abstraction over the job-queue snapshot source.
//!
//! The `QueueSource` trait allows the publisher to work with the real
//! `squeue` command on a cluster and with mock implementations in tests.

use std::io;
use std::time::Duration;

/// Error produced when a queue snapshot cannot be taken.
#[derive(Debug)]
pub enum SnapshotError {
    /// The command could not be started.
    Spawn { program: String, source: io::Error },
    /// Reading the command's output failed.
    Read(io::Error),
    /// Waiting for the command to exit failed.
    Wait(io::Error),
    /// The command exited unsuccessfully. `code` is `None` when it was killed by a signal.
    Status { code: Option<i32>, stderr: String },
    /// The command did not finish in time and was killed.
    Timeout(Duration),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program, source)
            }
            SnapshotError::Read(e) => write!(f, "failed to read queue output: {}", e),
            SnapshotError::Wait(e) => write!(f, "failed to wait for queue command: {}", e),
            SnapshotError::Status { code, stderr } => {
                match code {
                    Some(code) => write!(f, "queue command exited with status {}", code)?,
                    None => write!(f, "queue command terminated by signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            SnapshotError::Timeout(after) => {
                write!(f, "queue command timed out after {:?}", after)
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Spawn { source, .. } => Some(source),
            SnapshotError::Read(e) | SnapshotError::Wait(e) => Some(e),
            SnapshotError::Status { .. } | SnapshotError::Timeout(_) => None,
        }
    }
}

/// Source of raw job-queue snapshots.
///
/// Each call must take a fresh snapshot: one job per line, fields
/// `jobid|user|state|cpus|gres|nodes`. Implementations are shared between
/// concurrent scrapes and must not keep per-call state.
pub trait QueueSource: Send + Sync {
    /// Takes a snapshot of the job queue and returns the raw output bytes.
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError>;
}
