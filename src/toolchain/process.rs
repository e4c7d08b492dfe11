//! Bounded child-process execution
//!
//! Output is drained on reader threads while the parent polls for exit,
//! the timeout and the run's cancellation flag.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::signal::CancelToken;

/// Maximum captured stderr carried in errors
const STDERR_TAIL_BYTES: usize = 4096;

/// Poll interval while waiting for a child
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    TimedOut { program: String, seconds: u64 },

    #[error("{program} cancelled")]
    Cancelled { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled { .. })
    }
}

/// Result type for tool execution
pub type ToolResult<T> = Result<T, ToolError>;

/// A single external command with its bound
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Program file name, used in errors and logs
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }
}

/// Captured output of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last few KiB of stderr, or stdout if stderr is empty
    pub fn error_tail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        tail(source.trim(), STDERR_TAIL_BYTES)
    }
}

/// Runs external tools with a timeout and cooperative cancellation
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    cancel: CancelToken,
}

impl ToolRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run to completion; the exit status is returned, not judged.
    pub fn run(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
        let program = invocation.program_name();
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled { program });
        }

        debug!(command = %invocation.display(), "spawning tool");
        let start = Instant::now();

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        let status = loop {
            if self.cancel.is_cancelled() {
                kill(&mut child);
                return Err(ToolError::Cancelled { program });
            }

            if start.elapsed() > invocation.timeout {
                kill(&mut child);
                return Err(ToolError::TimedOut {
                    program,
                    seconds: invocation.timeout.as_secs(),
                });
            }

            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = join_output(stdout_handle);
        let stderr = join_output(stderr_handle);
        let duration = start.elapsed();
        debug!(%program, %status, elapsed_ms = duration.as_millis() as u64, "tool finished");

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Run and treat a non-zero exit as `ToolError::Failed`
    pub fn run_checked(&self, invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
        let output = self.run(invocation)?;
        if output.success() {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                program: invocation.program_name(),
                status: output.status.to_string(),
                stderr: output.error_tail(),
            })
        }
    }
}

// Reader threads are detached on timeout/cancel: a grandchild may still hold
// the pipe open after the direct child is killed.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
