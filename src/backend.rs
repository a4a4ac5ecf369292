//! Search backend driver.
//!
//! Runs the external grep-style search tool as a sandboxed child and parses
//! its line-oriented output into [`SearchResult`] values. The backend runs
//! from the knowledge root with relative targets, so every path it prints
//! is already root-relative and no absolute filesystem detail reaches the
//! caller.
//!
//! Output grammar (with line numbers and context enabled):
//!
//! ```text
//! path:LINE:matched text
//! path-LINE-context text
//! --
//! ```
//!
//! Matches use `:` separators, context lines `-`, and `--` separates
//! context groups.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::errors::{AccessError, ExecutionError, SearchError};
use crate::exec::{read_bounded, ExecRequest, SandboxedExecutor};
use crate::query::SearchQuery;

const STDERR_CAP: usize = 64 * 1024;
const ERROR_LINE_MAX: usize = 120;

/// One matched line with its surrounding context.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    /// Root-relative path of the file, as printed by the backend.
    pub path: String,
    pub line: u64,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

/// Outcome of one search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub searched_path: String,
    pub matches: Vec<MatchRecord>,
    pub total_matches: usize,
    /// True when the result cap cut the stream short.
    pub truncated: bool,
    /// First protocol irregularity seen while parsing, if any. Matches
    /// collected before it are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
}

/// Drives the external search tool.
#[derive(Debug, Clone)]
pub struct SearchBackend {
    program: String,
    timeout: Duration,
    max_output_bytes: usize,
    executor: SandboxedExecutor,
}

impl SearchBackend {
    pub fn new(
        program: impl Into<String>,
        timeout: Duration,
        max_output_bytes: usize,
        executor: SandboxedExecutor,
    ) -> Self {
        Self {
            program: program.into(),
            timeout,
            max_output_bytes,
            executor,
        }
    }

    /// Runs one query under the wall-clock deadline, stopping the child as
    /// soon as the match cap is exceeded.
    pub async fn search(
        &self,
        query: &SearchQuery,
        root: &Path,
    ) -> Result<SearchResult, AccessError> {
        let mut request = ExecRequest::new(self.program.clone(), query.to_backend_args());
        request.current_dir = Some(root.to_path_buf());
        request.timeout = self.timeout;
        request.max_output_bytes = self.max_output_bytes;
        request.allowed_exit_codes = vec![0, 1];

        let mut spawned = self.executor.spawn(&request)?;
        let program = spawned.program.clone();
        let deadline = spawned.deadline;

        let stdout = spawned.child.stdout.take();
        let stderr = spawned.child.stderr.take();
        let stderr_task = tokio::spawn(async move { read_bounded(stderr, STDERR_CAP).await });

        let mut lines = BufReader::new(stdout.ok_or_else(|| {
            SearchError::BackendProtocol("backend stdout unavailable".to_string())
        })?)
        .lines();

        let mut parser = OutputParser::new(query.max_results);
        let mut consumed = 0usize;
        let mut capped = false;

        loop {
            let next = match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(program = %program, "search backend timed out, killing");
                    spawned.shutdown().await;
                    return Err(ExecutionError::Timeout {
                        program,
                        timeout: self.timeout,
                    }
                    .into());
                }
            };
            let Some(line) = next.map_err(AccessError::Io)? else {
                break;
            };

            consumed += line.len() + 1;
            if consumed > self.max_output_bytes {
                parser.truncated = true;
                parser.note_error("backend output exceeded the byte cap");
                capped = true;
                break;
            }
            if !parser.feed(&line) {
                capped = true;
                break;
            }
        }

        if capped {
            // The child may still be producing; stop it and skip the exit
            // status, the collected matches are the result.
            spawned.shutdown().await;
        } else {
            let status = match tokio::time::timeout_at(deadline, spawned.child.wait()).await {
                Ok(status) => status.map_err(AccessError::Io)?,
                Err(_) => {
                    spawned.shutdown().await;
                    return Err(ExecutionError::Timeout {
                        program,
                        timeout: self.timeout,
                    }
                    .into());
                }
            };
            let code = status.code().unwrap_or(-1);
            if !request.allowed_exit_codes.contains(&code) {
                let (stderr_bytes, _) = stderr_task.await.unwrap_or_default();
                return Err(ExecutionError::NonZeroExit {
                    program,
                    status: code,
                    stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
                }
                .into());
            }
        }

        let result = parser.finish(query);
        debug!(
            query = %result.query,
            matches = result.total_matches,
            truncated = result.truncated,
            "search finished"
        );
        Ok(result)
    }
}

// ============================================================================
// Output parsing
// ============================================================================

struct OutputParser {
    cap: usize,
    matches: Vec<MatchRecord>,
    pending_before: Vec<String>,
    current: Option<usize>,
    truncated: bool,
    error: Option<String>,
}

impl OutputParser {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            matches: Vec::new(),
            pending_before: Vec::new(),
            current: None,
            truncated: false,
            error: None,
        }
    }

    /// Consumes one output line. Returns false when a match past the cap
    /// arrives, which tells the caller to stop the backend.
    fn feed(&mut self, line: &str) -> bool {
        if line == "--" {
            self.current = None;
            self.pending_before.clear();
            return true;
        }
        if let Some((path, number, text)) = split_numbered(line, ':') {
            if self.matches.len() >= self.cap {
                self.truncated = true;
                return false;
            }
            let before = std::mem::take(&mut self.pending_before);
            self.matches.push(MatchRecord {
                path: path.to_string(),
                line: number,
                text: text.to_string(),
                before,
                after: Vec::new(),
            });
            self.current = Some(self.matches.len() - 1);
            return true;
        }
        if let Some((path, number, text)) = split_numbered(line, '-') {
            if let Some(index) = self.current {
                let open = &mut self.matches[index];
                if open.path == path && number > open.line {
                    open.after.push(text.to_string());
                    return true;
                }
            }
            self.pending_before.push(text.to_string());
            return true;
        }
        if !line.trim().is_empty() {
            self.note_error(&format!("unrecognized backend line: {}", compact(line)));
        }
        true
    }

    fn note_error(&mut self, message: &str) {
        if self.error.is_none() {
            warn!(detail = message, "search backend protocol irregularity");
            self.error = Some(message.to_string());
        }
    }

    fn finish(self, query: &SearchQuery) -> SearchResult {
        let total_matches = self.matches.len();
        SearchResult {
            query: query.terms().to_string(),
            searched_path: query.scope.label(),
            matches: self.matches,
            total_matches,
            truncated: self.truncated,
            backend_error: self.error,
        }
    }
}

/// Splits `path<sep>NUMBER<sep>text` at the first separator pair that
/// encloses digits. Handles paths containing the separator by scanning
/// forward until a numeric segment is found.
fn split_numbered(line: &str, sep: char) -> Option<(&str, u64, &str)> {
    let mut from = 0;
    while let Some(offset) = line[from..].find(sep) {
        let at = from + offset;
        let rest = &line[at + 1..];
        match rest.find(sep) {
            Some(end) => {
                let digits = &rest[..end];
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(number) = digits.parse() {
                        return Some((&line[..at], number, &rest[end + 1..]));
                    }
                }
                from = at + 1;
            }
            None => return None,
        }
    }
    None
}

fn compact(line: &str) -> String {
    if line.len() <= ERROR_LINE_MAX {
        return line.to_string();
    }
    let mut end = ERROR_LINE_MAX;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &line[..end])
}
