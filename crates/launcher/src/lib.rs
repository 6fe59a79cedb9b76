//! Webhook receiver process launcher.
//!
//! Implements the [`pipeline::CommandLauncher`] trait by spawning the
//! configured argument vector directly with [`tokio::process`], never through a
//! shell.
//!
//! ## Execution modes
//!
//! | Mode | stdout / stderr | Returns | Time limit |
//! |------|-----------------|---------|------------|
//! | Foreground | captured and logged | after exit | entry `timeout_secs`, else launcher default |
//! | Background | inherited from the receiver | right after spawn | none |
//!
//! A foreground run ends when the child exits, even if processes it started
//! still hold its output pipes; up to 64 KiB of each stream is logged. On unix
//! a foreground child leads its own process group, and when it outlives its
//! limit the whole group is killed. Background children are never killed; a
//! detached task reaps them so they do not linger as zombies, and logs their
//! exit status at debug level.
//!
//! ## Payload delivery
//!
//! With [`PayloadDelivery::Stdin`] the raw request body is written to the
//! child's standard input from a separate task, then stdin is closed. A child
//! that exits without reading its input is not an error.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning and OS error handling live here; the
//! [`pipeline`] crate sees only [`pipeline::LaunchReport`] and
//! [`pipeline::LaunchError`].

use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    CommandLauncher, ExecutionMode, LaunchError, LaunchReport, ProjectEntry, ProjectId,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Whether launched commands receive the request body on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadDelivery {
    /// Write the raw body to stdin, then close it.
    #[default]
    Stdin,
    /// Connect stdin to the null device.
    Discard,
}

impl FromStr for PayloadDelivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdin" => Ok(Self::Stdin),
            "none" | "discard" => Ok(Self::Discard),
            other => Err(format!(
                "unknown payload delivery '{other}' (expected 'stdin' or 'none')"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Spawns configured commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    delivery: PayloadDelivery,
    default_timeout: Option<Duration>,
}

impl ProcessLauncher {
    /// Creates a launcher.
    ///
    /// `default_timeout` bounds foreground runs whose entry sets no limit of
    /// its own; `None` lets them run until they exit.
    pub fn new(delivery: PayloadDelivery, default_timeout: Option<Duration>) -> Self {
        Self {
            delivery,
            default_timeout,
        }
    }

    fn command_for(&self, entry: &ProjectEntry) -> Command {
        let mut cmd = Command::new(entry.command().program());
        cmd.args(entry.command().args());
        cmd.stdin(match self.delivery {
            PayloadDelivery::Stdin => Stdio::piped(),
            PayloadDelivery::Discard => Stdio::null(),
        });
        match entry.mode() {
            ExecutionMode::Foreground => {
                cmd.stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                // Own group, so a timeout can take down everything the
                // command started.
                #[cfg(unix)]
                cmd.process_group(0);
            }
            ExecutionMode::Background => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }
        cmd
    }

    async fn wait_foreground(
        &self,
        project: &ProjectId,
        entry: &ProjectEntry,
        mut child: Child,
    ) -> Result<LaunchReport, LaunchError> {
        let program = entry.command().program().to_string();
        let stdout = child.stdout.take().map(OutputCapture::start);
        let stderr = child.stderr.take().map(OutputCapture::start);

        let limit = entry.timeout().or(self.default_timeout);
        let waited = match limit {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await.ok() {
                Some(result) => result,
                None => {
                    kill_process_group(project, &mut child).await;
                    for capture in [stdout, stderr].into_iter().flatten() {
                        capture.abort();
                    }
                    return Err(LaunchError::TimedOut {
                        program,
                        after: limit,
                    });
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|source| LaunchError::Wait { program, source })?;

        // The command has exited; anything it left running may still hold
        // the pipes open, so output is collected without waiting for EOF.
        if let Some(capture) = stdout {
            let stdout = capture.finish().await;
            if !stdout.is_empty() {
                let stdout = String::from_utf8_lossy(&stdout);
                info!(%project, stdout = %stdout.trim_end(), "command output");
            }
        }
        if let Some(capture) = stderr {
            let stderr = capture.finish().await;
            if !stderr.is_empty() {
                let stderr = String::from_utf8_lossy(&stderr);
                warn!(%project, stderr = %stderr.trim_end(), "command error output");
            }
        }
        Ok(LaunchReport::Completed {
            exit_code: status.code(),
        })
    }
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Bytes of each foreground output stream kept for logging; the rest is
/// drained and dropped.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// How long output is still collected after a foreground command exits.
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// Drains one child output stream on its own task.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputCapture {
    fn start<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(drain(reader, Arc::clone(&buffer)));
        Self { buffer, task }
    }

    /// Waits briefly for end of stream, then returns what was read so far.
    async fn finish(mut self) -> Vec<u8> {
        if tokio::time::timeout(OUTPUT_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buffer)
    }

    fn abort(self) {
        self.task.abort();
    }
}

async fn drain<R>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let room = CAPTURE_LIMIT.saturating_sub(buffer.len());
        buffer.extend_from_slice(&chunk[..n.min(room)]);
    }
}

/// Kills a timed-out foreground command together with anything it started.
async fn kill_process_group(project: &ProjectId, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(%project, pid, error = %err, "failed to signal command process group");
        }
    }
    if let Err(err) = child.kill().await {
        debug!(%project, error = %err, "failed to kill timed-out command");
    }
}

#[async_trait]
impl CommandLauncher for ProcessLauncher {
    async fn launch(
        &self,
        project: &ProjectId,
        entry: &ProjectEntry,
        payload: &[u8],
    ) -> Result<LaunchReport, LaunchError> {
        let mut child = self
            .command_for(entry)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: entry.command().program().to_string(),
                source,
            })?;
        let pid = child.id();
        debug!(%project, pid, "spawned command");

        let writer = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(write_payload(project.clone(), stdin, payload.to_vec())));

        match entry.mode() {
            ExecutionMode::Foreground => self.wait_foreground(project, entry, child).await,
            ExecutionMode::Background => {
                tokio::spawn(reap(project.clone(), child, writer));
                Ok(LaunchReport::Detached { pid })
            }
        }
    }
}

async fn write_payload(project: ProjectId, mut stdin: ChildStdin, payload: Vec<u8>) {
    if let Err(err) = stdin.write_all(&payload).await {
        debug!(%project, error = %err, "command did not read its payload");
        return;
    }
    if let Err(err) = stdin.shutdown().await {
        debug!(%project, error = %err, "failed to close command stdin");
    }
}

async fn reap(project: ProjectId, mut child: Child, writer: Option<JoinHandle<()>>) {
    match child.wait().await {
        Ok(status) => debug!(%project, exit_code = status.code(), "background command exited"),
        Err(err) => warn!(%project, error = %err, "failed to reap background command"),
    }
    if let Some(writer) = writer {
        let _ = writer.await;
    }
}
