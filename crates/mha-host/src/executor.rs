// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-shot stdio process execution.
//!
//! [`ProcessExecutor::execute`] launches the command, writes the input plus a
//! newline to stdin, returns the first stdout line, and always kills/reaps the
//! child and joins the stderr drain before returning.

use crate::{CancelReason, CancelToken, ExecContext, ExecError, IoStage};
use std::collections::BTreeMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Upper bound on captured stderr bytes; the rest is drained and discarded.
pub const DEFAULT_STDERR_LIMIT: usize = 1024 * 1024;

/// How long to wait for stderr EOF after the child exits.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Cap on the stderr wait once the context has already ended.
pub const CANCELLED_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Everything needed to launch one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Executable command to run.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Environment overrides layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Bytes written to stdin, followed by a single newline.
    pub input: Vec<u8>,
}

impl ExecutionRequest {
    /// Create a request with the given command and empty args/env/input.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Replace the argument list.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set one environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the stdin payload.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = input.into();
        self
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// First stdout line, without its line terminator.
    pub line: Vec<u8>,
    /// Standard error captured while the process ran.
    pub stderr: String,
    /// OS process id, if it was observable.
    pub pid: Option<u32>,
    /// Wall time from spawn to reap.
    pub elapsed: Duration,
}

/// Runs [`ExecutionRequest`]s, one child process per call.
///
/// Stateless apart from its tuning knobs, so one executor can serve any
/// number of concurrent calls.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    stderr_limit: usize,
    drain_grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            stderr_limit: DEFAULT_STDERR_LIMIT,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

enum Outcome {
    Finished(Result<(Vec<u8>, ExitStatus), ExecError>),
    Cancelled(CancelReason),
}

impl ProcessExecutor {
    /// Executor with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of stderr bytes kept in memory.
    pub fn with_stderr_limit(mut self, limit: usize) -> Self {
        self.stderr_limit = limit;
        self
    }

    /// Bound the post-exit wait for stderr EOF (a grandchild may still hold it).
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Execute `req` under `ctx`.
    ///
    /// On success the child has exited with a zero status and its first
    /// stdout line is returned. On every path, including cancellation, the
    /// child is reaped and the stderr drain task is joined exactly once
    /// before this returns.
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        req: &ExecutionRequest,
    ) -> Result<ExecutionOutput, ExecError> {
        if req.command.is_empty() {
            return Err(ExecError::Setup("empty command".into()));
        }
        ctx.check().map_err(ExecError::cancelled)?;

        let started = Instant::now();
        let mut cmd = Command::new(&req.command);
        cmd.args(&req.args)
            .envs(&req.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Start {
            command: req.command.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(target: "mha.exec", command = %req.command, pid = ?pid, "process started");

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => {
                    terminate(&mut child).await;
                    return Err(ExecError::Setup("child stdio handles unavailable".into()));
                }
            };

        // Drain stderr before touching stdin: a child that fills the stderr
        // pipe before reading its input would otherwise block forever.
        let stop_drain = CancelToken::new();
        let drain = tokio::spawn(drain_stderr(stderr, self.stderr_limit, stop_drain.clone()));

        let mut stdout = BufReader::new(stdout);
        let outcome = tokio::select! {
            res = exchange(&mut child, stdin, &mut stdout, &req.input) => Outcome::Finished(res),
            reason = ctx.done() => Outcome::Cancelled(reason),
        };

        let result = match outcome {
            Outcome::Finished(Ok(done)) => Ok(done),
            Outcome::Finished(Err(e)) => {
                terminate(&mut child).await;
                Err(e)
            }
            Outcome::Cancelled(reason) => {
                debug!(target: "mha.exec", pid = ?pid, %reason, "killing process");
                terminate(&mut child).await;
                Err(ExecError::cancelled(reason))
            }
        };

        // Unread stdout stays open until the child is gone so trailing output
        // does not turn into SIGPIPE.
        drop(stdout);
        let stderr = self.join_drain(drain, &stop_drain, ctx).await;
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let elapsed = started.elapsed();

        let (line, status) = match result {
            Ok(done) => done,
            Err(ExecError::Cancelled { reason, .. }) => {
                return Err(ExecError::Cancelled { reason, stderr });
            }
            Err(e) => return Err(e),
        };
        if !status.success() {
            debug!(
                target: "mha.exec",
                pid = ?pid,
                exit_code = ?status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "process failed"
            );
            return Err(ExecError::Process {
                code: status.code(),
                stderr,
            });
        }

        debug!(
            target: "mha.exec",
            pid = ?pid,
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = line.len(),
            "process completed"
        );
        Ok(ExecutionOutput {
            line,
            stderr,
            pid,
            elapsed,
        })
    }

    /// Join the drain task, stopping it first if stderr does not reach EOF
    /// within the grace period or the context ends. A stopped drain still
    /// returns what it captured.
    ///
    /// A context that has already ended shortens the grace period to
    /// [`CANCELLED_DRAIN_GRACE`] so the killed child's last output is kept.
    async fn join_drain(
        &self,
        mut drain: JoinHandle<Vec<u8>>,
        stop: &CancelToken,
        ctx: &ExecContext,
    ) -> Vec<u8> {
        let live = ctx.check().is_ok();
        let grace = if live {
            self.drain_grace
        } else {
            self.drain_grace.min(CANCELLED_DRAIN_GRACE)
        };
        let joined = tokio::select! {
            biased;
            res = &mut drain => Some(res),
            _ = tokio::time::sleep(grace) => None,
            _ = ctx.done(), if live => None,
        };
        let res = match joined {
            Some(res) => res,
            None => {
                stop.cancel();
                drain.await
            }
        };
        match res {
            Ok(buf) => buf,
            Err(e) => {
                debug!(target: "mha.exec", error = %e, "stderr drain did not finish");
                Vec::new()
            }
        }
    }
}

/// Write the input, read the first line, then wait for exit.
async fn exchange<R>(
    child: &mut Child,
    stdin: ChildStdin,
    stdout: &mut R,
    input: &[u8],
) -> Result<(Vec<u8>, ExitStatus), ExecError>
where
    R: AsyncBufRead + Unpin,
{
    // Read concurrently with the write so a child that echoes while it
    // consumes a large input cannot wedge on a full stdout pipe.
    let (_, line) = tokio::try_join!(write_input(stdin, input), async {
        read_first_line(stdout)
            .await
            .map_err(|source| ExecError::Io {
                stage: IoStage::ReadStdout,
                source,
            })
    })?;

    let status = child.wait().await.map_err(|source| ExecError::Io {
        stage: IoStage::Wait,
        source,
    })?;
    Ok((line, status))
}

/// Write `input` and a newline, then close stdin.
///
/// A broken pipe means the child closed its input early; that is left for
/// the exit status to judge.
async fn write_input(mut stdin: ChildStdin, input: &[u8]) -> Result<(), ExecError> {
    let res = async {
        stdin.write_all(input).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        stdin.shutdown().await
    }
    .await;
    drop(stdin);

    match res {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!(target: "mha.exec", "child closed stdin before reading all input");
            Ok(())
        }
        Err(source) => Err(ExecError::Io {
            stage: IoStage::WriteStdin,
            source,
        }),
    }
}

/// Read up to and including the first `\n`, returning the line without
/// `\n` or `\r\n`. EOF before any newline yields whatever was read.
pub(crate) async fn read_first_line<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    Ok(line)
}

async fn drain_stderr(mut stderr: ChildStderr, limit: usize, stop: CancelToken) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut discarded = 0usize;
    loop {
        let read = tokio::select! {
            biased;
            read = stderr.read(&mut chunk) => read,
            _ = stop.cancelled() => {
                debug!(target: "mha.exec.stderr", "stderr still open; drain stopped");
                break;
            }
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                let take = n.min(room);
                kept.extend_from_slice(&chunk[..take]);
                discarded += n - take;
            }
            Err(e) => {
                debug!(target: "mha.exec.stderr", error = %e, "stderr read failed");
                break;
            }
        }
    }
    if discarded > 0 {
        warn!(target: "mha.exec.stderr", discarded, "stderr exceeded capture limit");
    }
    kept
}

/// Kill the child if it is still running and reap it.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(target: "mha.exec", error = %e, "kill failed (process likely exited)");
    }
    if let Err(e) = child.wait().await {
        warn!(target: "mha.exec", error = %e, "failed to reap process");
    }
}
