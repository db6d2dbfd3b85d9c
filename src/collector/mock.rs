//! In-memory queue source for testing without a Slurm controller.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collector::traits::{QueueSource, SnapshotError};

/// Queue source that replays canned `squeue` output.
///
/// Can also simulate a failing command, which is how the scrape error
/// path is exercised in tests.
#[derive(Debug, Default)]
pub struct MockQueue {
    output: Vec<u8>,
    failure: Option<(Option<i32>, String)>,
    calls: AtomicUsize,
}

impl MockQueue {
    /// Creates a source that always returns `output`.
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// Creates a source whose command always exits with `code` and `stderr`.
    pub fn failing(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            failure: Some((Some(code), stderr.into())),
            ..Self::default()
        }
    }

    /// A small cluster with a mix of states, users and GPU jobs.
    pub fn typical_cluster() -> Self {
        Self::new(
            "\
1001|alice|RUNNING|8|gpu:v100:1|2
1002|alice|PENDING|4|N/A|1
1003|bob|RUNNING|32|N/A|1
1004|bob|RUNNING|16|gpu:a100:4|2
1005|carol|SUSPENDED|2|N/A|1
1006|dave|COMPLETED|64|gpu:a100:8|8
1007|carol|PENDING|1|N/A|1
",
        )
    }

    /// Number of snapshots taken so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl QueueSource for MockQueue {
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.failure {
            Some((code, stderr)) => Err(SnapshotError::Status {
                code: *code,
                stderr: stderr.clone(),
            }),
            None => Ok(self.output.clone()),
        }
    }
}
