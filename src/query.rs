//! Search query model.
//!
//! Queries use the backend's boolean syntax: space-separated terms are
//! AND-ed, `|` is OR, a leading `-` negates a term, and double quotes group
//! an exact phrase. The engine validates shape here and hands translation
//! to [`SearchQuery::to_backend_args`]; ranking and matching stay inside
//! the backend process.

use std::fmt;

use crate::errors::SearchError;
use crate::paths::RootedPath;

/// Where a search runs, always inside the knowledge root.
#[derive(Debug, Clone)]
pub enum Scope {
    /// The whole knowledge root.
    Global,
    /// A single collection directory.
    Collection(RootedPath),
    /// One document file.
    Document(RootedPath),
}

impl Scope {
    /// Relative target path handed to the backend, with the backend running
    /// from the knowledge root.
    pub fn target(&self) -> String {
        match self {
            Scope::Global => ".".to_string(),
            Scope::Collection(path) | Scope::Document(path) => {
                let shown = path.relative().display().to_string();
                if shown.is_empty() {
                    ".".to_string()
                } else {
                    shown
                }
            }
        }
    }

    /// Human label for result payloads: `/` for the root, the relative path
    /// otherwise.
    pub fn label(&self) -> String {
        match self {
            Scope::Global => "/".to_string(),
            Scope::Collection(path) | Scope::Document(path) => path.label(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A validated search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    terms: String,
    pub scope: Scope,
    pub max_results: usize,
    pub context_lines: usize,
}

impl SearchQuery {
    pub fn new(
        terms: &str,
        scope: Scope,
        max_results: usize,
        context_lines: usize,
    ) -> Result<Self, SearchError> {
        let terms = terms.trim();
        if terms.is_empty() {
            return Err(SearchError::QuerySyntax("query is empty".to_string()));
        }
        if terms.matches('"').count() % 2 != 0 {
            return Err(SearchError::QuerySyntax(format!(
                "unbalanced quotes in '{terms}'"
            )));
        }
        Ok(Self {
            terms: terms.to_string(),
            scope,
            max_results,
            context_lines,
        })
    }

    pub fn terms(&self) -> &str {
        &self.terms
    }

    /// Argument vector for the search backend. The query is one positional
    /// argument; the backend's own option parsing never sees the terms as
    /// flags because the options come first.
    pub fn to_backend_args(&self) -> Vec<String> {
        let mut args = vec![
            "--bool".to_string(),
            "--line-number".to_string(),
            "--with-filename".to_string(),
            "--ignore-case".to_string(),
            "--recursive".to_string(),
        ];
        if self.context_lines > 0 {
            args.push(format!("--context={}", self.context_lines));
        }
        args.push(format!("--max-count={}", self.max_results));
        args.push(self.terms.clone());
        args.push(self.scope.target());
        args
    }
}
