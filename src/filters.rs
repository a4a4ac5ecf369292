//! Extraction filter registry and command policy.
//!
//! A [`FilterSpec`] maps document extensions to an external command template
//! that converts the document to text on stdout. The registry is built once
//! from configuration and immutable afterwards; the [`FilterPolicy`] is
//! consulted again on every invocation, so a spec resolved at startup never
//! bypasses authorization.
//!
//! Command templates are argument vectors with placeholder elements:
//! `{path}` for the input file, and `{first}`/`{last}` inside `page_args`
//! for page ranges. An empty `command` template marks a plain-text format
//! that is read directly without spawning anything.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::errors::FilterError;

fn default_filter_timeout_secs() -> u64 {
    30
}

/// How the filter's stdout is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Output is expected to be UTF-8 text.
    #[default]
    Text,
    /// Output is a binary-to-text conversion; decoded leniently.
    Binary,
}

/// One extraction filter definition, loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Extensions this filter handles, without the leading dot.
    pub extensions: Vec<String>,
    /// Command template; empty means "read the file directly as text".
    #[serde(default)]
    pub command: Vec<String>,
    /// Extra arguments spliced in before `{path}` when a page range is
    /// requested; may contain `{first}` and `{last}` placeholders.
    #[serde(default)]
    pub page_args: Vec<String>,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default = "default_filter_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional metadata command (e.g. `pdfinfo {path}`) used for page
    /// counts; subject to the same policy and timeout rules.
    #[serde(default)]
    pub info_command: Vec<String>,
}

impl FilterSpec {
    /// Whether this format is read directly, without a subprocess.
    pub fn is_direct(&self) -> bool {
        self.command.is_empty()
    }

    /// Whether the filter accepts a page range.
    pub fn supports_pages(&self) -> bool {
        !self.page_args.is_empty()
    }

    /// Whether the filter declares a metadata command.
    pub fn has_info_command(&self) -> bool {
        !self.info_command.is_empty()
    }

    /// Renders the extraction argv for `path`, optionally with a page range.
    pub fn render(&self, path: &Path, pages: Option<(u32, u32)>) -> Vec<String> {
        let shown = path.to_string_lossy();
        let mut argv = Vec::with_capacity(self.command.len() + self.page_args.len());
        for element in &self.command {
            if element.contains("{path}") {
                if let Some((first, last)) = pages {
                    for page_arg in &self.page_args {
                        argv.push(substitute_pages(page_arg, first, last));
                    }
                }
                argv.push(element.replace("{path}", &shown));
            } else {
                argv.push(element.clone());
            }
        }
        argv
    }

    /// Renders the metadata argv for `path`.
    pub fn render_info(&self, path: &Path) -> Vec<String> {
        let shown = path.to_string_lossy();
        self.info_command
            .iter()
            .map(|element| element.replace("{path}", &shown))
            .collect()
    }
}

fn substitute_pages(element: &str, first: u32, last: u32) -> String {
    element
        .replace("{first}", &first.to_string())
        .replace("{last}", &last.to_string())
}

/// Bare program name of a command template, for policy checks and errors.
/// A configured absolute path is reduced to its file name so host layout
/// never leaks into messages.
pub fn program_name(command: &[String]) -> String {
    command
        .first()
        .map(|program| {
            Path::new(program)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.clone())
        })
        .unwrap_or_default()
}

// ============ Policy ============

/// Runtime-selected authorization strategy for filter commands.
///
/// Chosen once at configuration load and never switched afterwards.
/// Whitelist is the default and fails closed; blacklist is strictly weaker
/// (anything not denied is allowed) and intended for trusted setups only.
#[derive(Debug, Clone)]
pub enum FilterPolicy {
    /// Only commands whose program name (or full template) exactly matches
    /// a configured entry are allowed.
    Whitelist(BTreeSet<String>),
    /// Commands are allowed unless the program name matches a denylist
    /// entry by exact name or substring.
    Blacklist(Vec<String>),
}

impl FilterPolicy {
    /// Builds a policy from configuration parts.
    pub fn from_parts(mode: &str, allow: &[String], deny: &[String]) -> Result<Self> {
        match mode {
            "whitelist" => Ok(FilterPolicy::Whitelist(allow.iter().cloned().collect())),
            "blacklist" => Ok(FilterPolicy::Blacklist(deny.to_vec())),
            other => bail!(
                "Unknown filter policy mode: '{}'. Must be whitelist or blacklist.",
                other
            ),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            FilterPolicy::Whitelist(_) => "whitelist",
            FilterPolicy::Blacklist(_) => "blacklist",
        }
    }

    /// Configured entries, for display.
    pub fn entries(&self) -> Vec<String> {
        match self {
            FilterPolicy::Whitelist(allow) => allow.iter().cloned().collect(),
            FilterPolicy::Blacklist(deny) => deny.clone(),
        }
    }

    /// Authorizes a command template. Called before every invocation.
    ///
    /// An empty template never spawns anything, so it passes trivially.
    /// Whitelist entries match the program's bare name, the program exactly
    /// as configured, or the full space-joined template (letting operators
    /// pin an exact argument shape).
    pub fn authorize(&self, command: &[String]) -> Result<(), FilterError> {
        let Some(program) = command.first() else {
            return Ok(());
        };
        let name = program_name(command);

        match self {
            FilterPolicy::Whitelist(allow) => {
                let joined = command.join(" ");
                if allow.contains(&name) || allow.contains(program) || allow.contains(&joined) {
                    Ok(())
                } else {
                    Err(FilterError::FilterDenied(name))
                }
            }
            FilterPolicy::Blacklist(deny) => {
                let hit = deny
                    .iter()
                    .any(|entry| name == *entry || name.contains(entry.as_str()));
                if hit {
                    Err(FilterError::FilterDenied(name))
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ============ Registry ============

/// Extension → filter lookup table. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    by_extension: HashMap<String, FilterSpec>,
}

impl FilterRegistry {
    pub fn new(specs: &[FilterSpec]) -> Self {
        let mut by_extension = HashMap::new();
        for spec in specs {
            for extension in &spec.extensions {
                by_extension.insert(extension.to_lowercase(), spec.clone());
            }
        }
        Self { by_extension }
    }

    /// Looks up the filter for an extension (case-insensitive, with or
    /// without the leading dot).
    pub fn resolve(&self, extension: &str) -> Result<&FilterSpec, FilterError> {
        let key = extension.trim_start_matches('.').to_lowercase();
        self.by_extension
            .get(&key)
            .ok_or(FilterError::UnsupportedFormat(key))
    }

    pub fn supports(&self, extension: &str) -> bool {
        let key = extension.trim_start_matches('.').to_lowercase();
        self.by_extension.contains_key(&key)
    }

    /// All supported extensions, sorted.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }
}
