//! Sandboxed subprocess execution.
//!
//! Every external process the engine starts — the search backend and the
//! extraction filters — goes through [`SandboxedExecutor`]. The executor
//! enforces the sandbox contract and nothing else: a fixed argument vector,
//! a cleared environment (only `PATH` and explicit overrides survive), a
//! wall-clock timeout with forced termination, and bounded output capture.
//! It never interprets what the child wrote; that is the caller's job.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::errors::ExecutionError;
use crate::filters::program_name;

const STDERR_SNIPPET_MAX: usize = 512;

/// One subprocess invocation request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Environment the child receives on top of `PATH`.
    pub env: Vec<(String, String)>,
    /// Capture cap per stream; bytes past it are discarded and the result
    /// is flagged truncated.
    pub max_output_bytes: usize,
    /// Exit codes treated as success. grep-family backends exit 1 for
    /// "no matches", so the search path allows `{0, 1}`.
    pub allowed_exit_codes: Vec<i32>,
}

impl ExecRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
            timeout: Duration::from_secs(30),
            env: Vec::new(),
            max_output_bytes: 1024 * 1024,
            allowed_exit_codes: vec![0],
        }
    }

    /// Bare program name for logs and error messages.
    pub fn program_name(&self) -> String {
        program_name(std::slice::from_ref(&self.program))
    }
}

/// Outcome of one completed invocation.
#[derive(Debug)]
pub struct ExecutionResult {
    pub status: i32,
    /// Captured stdout, at most `max_output_bytes`.
    pub stdout: Vec<u8>,
    /// Captured stderr, decoded leniently and bounded.
    pub stderr: String,
    pub duration: Duration,
    /// True when either stream exceeded the capture cap.
    pub truncated: bool,
}

/// A child started for streaming consumption (search backend).
///
/// The caller owns the pipes and the read loop; [`SpawnedChild::shutdown`]
/// terminates and reaps the process on early exit paths. `kill_on_drop` is
/// set as the backstop for panics in the consumer.
pub struct SpawnedChild {
    pub child: Child,
    pub program: String,
    pub deadline: tokio::time::Instant,
    pub started: Instant,
}

impl SpawnedChild {
    /// Terminates the child and waits for it so no zombie is left behind.
    pub async fn shutdown(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// Spawns and supervises external commands under the sandbox contract.
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    path_env: String,
}

impl SandboxedExecutor {
    pub fn new() -> Self {
        Self {
            path_env: std::env::var("PATH").unwrap_or_default(),
        }
    }

    fn command(&self, request: &ExecRequest) -> Command {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .env_clear()
            .env("PATH", &self.path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(dir) = &request.current_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Starts a child for streaming consumption. The caller is responsible
    /// for honoring `deadline` and calling [`SpawnedChild::shutdown`] when
    /// it stops early.
    pub fn spawn(&self, request: &ExecRequest) -> Result<SpawnedChild, ExecutionError> {
        let program = request.program_name();
        debug!(program = %program, args = ?request.args, "spawning");
        let child = self
            .command(request)
            .spawn()
            .map_err(|source| ExecutionError::SpawnFailed {
                program: program.clone(),
                source,
            })?;
        Ok(SpawnedChild {
            child,
            program,
            deadline: tokio::time::Instant::now() + request.timeout,
            started: Instant::now(),
        })
    }

    /// Runs a command to completion with bounded capture.
    pub async fn run(&self, request: &ExecRequest) -> Result<ExecutionResult, ExecutionError> {
        let mut spawned = self.spawn(request)?;
        let started = spawned.started;
        let program = spawned.program.clone();

        // Pipes were requested at spawn, so take() always yields them.
        let stdout = spawned.child.stdout.take();
        let stderr = spawned.child.stderr.take();
        let cap = request.max_output_bytes;
        let stdout_task =
            tokio::spawn(async move { read_bounded(stdout, cap).await });
        let stderr_task =
            tokio::spawn(async move { read_bounded(stderr, cap).await });

        let status = tokio::select! {
            status = spawned.child.wait() => match status {
                Ok(status) => status,
                Err(source) => {
                    return Err(ExecutionError::SpawnFailed { program, source });
                }
            },
            _ = tokio::time::sleep_until(spawned.deadline) => {
                warn!(program = %program, timeout = ?request.timeout, "command timed out, killing");
                spawned.shutdown().await;
                return Err(ExecutionError::Timeout {
                    program,
                    timeout: request.timeout,
                });
            }
        };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr_bytes, stderr_truncated) = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
        let duration = started.elapsed();
        let code = status.code().unwrap_or(-1);

        if !request.allowed_exit_codes.contains(&code) {
            return Err(ExecutionError::NonZeroExit {
                program,
                status: code,
                stderr: snippet(&stderr),
            });
        }

        debug!(program = %program, status = code, ?duration, "command finished");
        Ok(ExecutionResult {
            status: code,
            stdout,
            stderr,
            duration,
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a stream to end, keeping at most `cap` bytes. The stream is always
/// drained so the child never blocks on a full pipe.
pub(crate) async fn read_bounded<R>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool)
where
    R: AsyncReadExt + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };

    let mut collected = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if collected.len() < cap {
                    let take = n.min(cap - collected.len());
                    collected.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (collected, truncated)
}

/// Bounded stderr excerpt for error messages, cut at a char boundary.
fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_SNIPPET_MAX {
        return trimmed.to_string();
    }
    let mut end = STDERR_SNIPPET_MAX;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
