//! `squeue` invocation.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collector::traits::{QueueSource, SnapshotError};

/// Default `squeue` arguments: all partitions, array jobs expanded one per
/// line, no header, and the six fields the parser expects.
pub const SQUEUE_ARGS: [&str; 5] = ["-a", "-r", "-h", "-o", "%A|%u|%T|%C|%b|%D"];

/// How often a running command is polled when a timeout is set.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output of a pipe, delivered by its drain thread once it hits EOF.
type Pipe = Receiver<io::Result<Vec<u8>>>;

/// Runs `squeue` (or a compatible command) and captures its stdout.
///
/// On Unix the command gets its own process group, so a timeout takes down
/// anything it forked along with it.
#[derive(Debug, Clone)]
pub struct SqueueCommand {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

/// Point in time after which a snapshot is abandoned.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    after: Duration,
}

impl Deadline {
    fn start(after: Duration) -> Self {
        Self {
            at: Instant::now() + after,
            after,
        }
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn expired(&self) -> SnapshotError {
        SnapshotError::Timeout(self.after)
    }
}

impl SqueueCommand {
    /// Creates a source that runs `program` with the standard [`SQUEUE_ARGS`].
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_args(program, SQUEUE_ARGS)
    }

    /// Creates a source that runs `program` with custom arguments.
    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// Fails the snapshot and kills the command if it has not produced its
    /// complete output within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<Child, SnapshotError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command.spawn().map_err(|source| SnapshotError::Spawn {
            program: self.program.clone(),
            source,
        })
    }

    /// Waits for exit and for both pipes to reach EOF, all within `deadline`.
    fn collect(
        &self,
        child: &mut Child,
        deadline: Option<Deadline>,
    ) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), SnapshotError> {
        // Both pipes are drained on their own threads so a chatty command
        // cannot block on a full pipe while we wait for it.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait(child, deadline)?;
        let stdout = receive(stdout, deadline)?;
        let stderr = match receive(stderr, deadline) {
            Err(SnapshotError::Timeout(after)) => return Err(SnapshotError::Timeout(after)),
            other => other.unwrap_or_default(),
        };
        Ok((status, stdout, stderr))
    }
}

impl QueueSource for SqueueCommand {
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        let t0 = Instant::now();
        let deadline = self.timeout.map(Deadline::start);
        let mut child = self.spawn()?;

        let (status, stdout, stderr) = match self.collect(&mut child, deadline) {
            Ok(output) => output,
            Err(SnapshotError::Timeout(after)) => {
                warn!(program = %self.program, timeout = ?after, "killing hung queue command");
                kill(&mut child);
                return Err(SnapshotError::Timeout(after));
            }
            Err(e) => return Err(e),
        };

        if !status.success() {
            return Err(SnapshotError::Status {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        debug!(
            program = %self.program,
            bytes = stdout.len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "queue snapshot taken"
        );
        Ok(stdout)
    }
}

fn wait(child: &mut Child, deadline: Option<Deadline>) -> Result<ExitStatus, SnapshotError> {
    let Some(deadline) = deadline else {
        return child.wait().map_err(SnapshotError::Wait);
    };

    loop {
        if let Some(status) = child.try_wait().map_err(SnapshotError::Wait)? {
            return Ok(status);
        }
        if deadline.remaining().is_zero() {
            return Err(deadline.expired());
        }
        thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
    }
}

/// Kills the command's whole process group, then the command itself.
fn kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pgid) = i32::try_from(child.id())
        .ok()
        .and_then(rustix::process::Pid::from_raw)
    {
        // ESRCH when the group is already gone.
        let _ = rustix::process::kill_process_group(pgid, rustix::process::Signal::Kill);
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Pipe {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        // The receiver is gone if the snapshot already timed out.
        let _ = tx.send(result);
    });
    rx
}

fn receive(pipe: Option<Pipe>, deadline: Option<Deadline>) -> Result<Vec<u8>, SnapshotError> {
    let Some(pipe) = pipe else {
        return Ok(Vec::new());
    };

    let received = match deadline {
        None => pipe.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(deadline) => match pipe.recv_timeout(deadline.remaining()) {
            Err(RecvTimeoutError::Timeout) => return Err(deadline.expired()),
            other => other,
        },
    };

    match received {
        Ok(result) => result.map_err(SnapshotError::Read),
        Err(_) => Err(SnapshotError::Read(io::Error::other(
            "pipe reader exited without a result",
        ))),
    }
}
