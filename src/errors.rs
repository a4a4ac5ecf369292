//! Error taxonomy for the document access engine.
//!
//! Every failure is classified into one of four kinds — path containment,
//! filter resolution/authorization, subprocess execution, or search backend
//! protocol — plus an umbrella [`AccessError`] returned by the facade.
//!
//! Messages only ever contain paths relative to the knowledge root and bare
//! program names. Absolute host paths are deliberately kept out of every
//! variant so errors can be surfaced to an untrusted caller verbatim.

use std::time::Duration;

use thiserror::Error;

/// Path validation failures. All paths in messages are relative to the root.
#[derive(Debug, Error)]
pub enum PathError {
    /// The candidate path escapes the knowledge root after normalization,
    /// or a symlink along it resolves outside the root.
    #[error("path escapes the knowledge root: {0}")]
    Traversal(String),

    /// A symlink was encountered while symlink following is disabled.
    #[error("symlink not permitted: {0}")]
    SymlinkDenied(String),

    /// The validated path does not exist (or has the wrong kind, e.g. a
    /// file where a collection was expected).
    #[error("not found: {0}")]
    NotFound(String),
}

/// Filter registry and policy failures.
#[derive(Debug, Error)]
pub enum FilterError {
    /// No filter is registered for the document's format, or the requested
    /// operation (e.g. a page range) is not supported by its filter.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The filter command was rejected by the active policy.
    #[error("filter command denied by policy: {0}")]
    FilterDenied(String),
}

/// Subprocess execution failures.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The child exceeded its wall-clock timeout and was terminated.
    #[error("command '{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The child exited with a status outside the allowed set.
    #[error("command '{program}' exited with status {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: i32,
        /// Bounded snippet of captured stderr.
        stderr: String,
    },

    /// The child could not be started at all.
    #[error("failed to start command '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Search backend failures.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Backend output did not match the expected line format. Matches
    /// parsed before the malformed line are still returned to the caller.
    #[error("backend output could not be parsed: {0}")]
    BackendProtocol(String),

    /// The query expression is malformed (empty, or unbalanced quotes).
    #[error("invalid query syntax: {0}")]
    QuerySyntax(String),
}

/// Umbrella error returned by the knowledge base facade.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Search(#[from] SearchError),

    /// Filesystem errors from listing and metadata calls. The message is
    /// the bare io error; callers add the relative path where useful.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Stable machine-readable code for the HTTP/MCP layers.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Path(PathError::NotFound(_)) => "not_found",
            AccessError::Path(PathError::Traversal(_)) => "traversal",
            AccessError::Path(PathError::SymlinkDenied(_)) => "symlink_denied",
            AccessError::Filter(FilterError::UnsupportedFormat(_)) => "unsupported_format",
            AccessError::Filter(FilterError::FilterDenied(_)) => "forbidden",
            AccessError::Execution(ExecutionError::Timeout { .. }) => "timeout",
            AccessError::Execution(_) => "execution_failed",
            AccessError::Search(SearchError::QuerySyntax(_)) => "bad_query",
            AccessError::Search(_) => "backend_protocol",
            AccessError::Io(_) => "io_error",
        }
    }
}
