//! External process execution.
//!
//! [`run`] spawns a command and moves bytes through all three of its standard
//! streams at the same time:
//!
//! - stdout is copied into the caller's sink on the calling task,
//! - stdin (when given) is fed from the caller's source alongside the stdout
//!   copy and closed afterwards,
//! - stderr is drained on a separately spawned task.
//!
//! A child blocks as soon as any of its pipe buffers fills up, so none of the
//! streams may wait for another one to finish. The runner only returns after
//! the child has exited and the stderr task has been joined.

mod command;

pub use command::CommandSpec;

use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::ChildStderr;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retained stderr lines. Older lines are still drained and logged, just not kept.
const MAX_STDERR_LINES: usize = 500;

/// Exit status and diagnostics of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    /// Trailing stderr lines, oldest first
    pub stderr_lines: Vec<String>,
    /// Bytes copied from the child's stdout into the sink
    pub stdout_bytes: u64,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `spec` to completion.
///
/// A nonzero exit code is returned as data. Errors are reserved for
/// spawn failures, stream faults and children killed by a signal.
pub async fn run<R, W>(spec: &CommandSpec, stdin: Option<R>, stdout: &mut W) -> Result<ProcessResult>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut cmd = spec.to_command();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    debug!("Executing command: {}", spec);

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: spec.program().to_string(),
        source,
    })?;

    let mut child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;
    let child_stdin = child.stdin.take();

    let stderr_task = tokio::spawn(drain_stderr(child_stderr, spec.program().to_string()));

    let feed = async move {
        let (Some(mut source), Some(mut sink)) = (stdin, child_stdin) else {
            return Ok::<u64, io::Error>(0);
        };
        let written = match tokio::io::copy(&mut source, &mut sink).await {
            Ok(n) => n,
            // The child exited or closed stdin early; its exit code tells the story.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Child closed stdin before all input was written");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        match sink.shutdown().await {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
            _ => {}
        }
        drop(sink);
        Ok(written)
    };

    let relay = async {
        let copied = tokio::io::copy(&mut child_stdout, stdout).await?;
        stdout.flush().await?;
        Ok::<u64, io::Error>(copied)
    };

    let streamed = tokio::try_join!(feed, relay);

    if streamed.is_err() {
        // Stop the child so wait() below cannot hang on a stream nobody reads.
        let _ = child.start_kill();
    }

    let status = child.wait().await?;
    let stderr_lines = stderr_task
        .await
        .map_err(|e| io::Error::other(format!("stderr drain task failed: {}", e)))??;

    let (stdin_bytes, stdout_bytes) = streamed?;

    let exit_code = status.code().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Interrupted,
            format!("'{}' terminated without an exit code ({})", spec.program(), status),
        )
    })?;

    debug!(
        exit_code,
        stdin_bytes,
        stdout_bytes,
        stderr_lines = stderr_lines.len(),
        "Process finished: {}",
        spec.program()
    );

    Ok(ProcessResult {
        exit_code,
        stderr_lines,
        stdout_bytes,
    })
}

/// Read stderr to EOF, relaying every line to the log.
async fn drain_stderr(stderr: ChildStderr, program: String) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(stderr);
    let mut lines = VecDeque::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        warn!(target: "dumpvault::process::stderr", program = %program, "{}", line);

        if lines.len() == MAX_STDERR_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    Ok(lines.into())
}
