use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filters::{FilterMode, FilterPolicy, FilterSpec};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Directory all document access is confined to.
    pub root: PathBuf,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_command")]
    pub command: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            command: default_search_command(),
            max_results: default_max_results(),
            context_lines: default_context_lines(),
            timeout_secs: default_search_timeout_secs(),
            pool_size: default_pool_size(),
            cache_size: default_cache_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_search_command() -> String {
    "ugrep".to_string()
}
fn default_max_results() -> usize {
    50
}
fn default_context_lines() -> usize {
    2
}
fn default_search_timeout_secs() -> u64 {
    30
}
fn default_pool_size() -> usize {
    4
}
fn default_cache_size() -> usize {
    100
}
fn default_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Hard ceiling on characters returned from one document read.
    #[serde(default = "default_max_read_chars")]
    pub max_read_chars: usize,
    /// Per-stream capture cap for child processes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_read_chars: default_max_read_chars(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

fn default_max_read_chars() -> usize {
    20_000
}
fn default_max_output_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct FiltersConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default = "default_filter_specs")]
    pub spec: Vec<FilterSpec>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            spec: default_filter_specs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_mode")]
    pub mode: String,
    #[serde(default = "default_policy_allow")]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: default_policy_mode(),
            allow: default_policy_allow(),
            deny: Vec::new(),
        }
    }
}

impl PolicyConfig {
    pub fn build(&self) -> Result<FilterPolicy> {
        FilterPolicy::from_parts(&self.mode, &self.allow, &self.deny)
    }
}

fn default_policy_mode() -> String {
    "whitelist".to_string()
}
fn default_policy_allow() -> Vec<String> {
    vec!["pdftotext".to_string(), "pdfinfo".to_string()]
}

fn default_filter_specs() -> Vec<FilterSpec> {
    vec![
        FilterSpec {
            extensions: ["md", "markdown", "txt", "rst"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            command: Vec::new(),
            page_args: Vec::new(),
            mode: FilterMode::Text,
            timeout_secs: 30,
            info_command: Vec::new(),
        },
        FilterSpec {
            extensions: vec!["pdf".to_string()],
            command: ["pdftotext", "-layout", "{path}", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            page_args: ["-f", "{first}", "-l", "{last}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mode: FilterMode::Text,
            timeout_secs: 30,
            info_command: ["pdfinfo", "{path}"].iter().map(|s| s.to_string()).collect(),
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.search.cache_ttl_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate knowledge
    if config.knowledge.root.as_os_str().is_empty() {
        anyhow::bail!("knowledge.root must not be empty");
    }

    // Validate search
    if config.search.command.trim().is_empty() {
        anyhow::bail!("search.command must not be empty");
    }
    if config.search.max_results < 1 {
        anyhow::bail!("search.max_results must be >= 1");
    }
    if config.search.pool_size < 1 {
        anyhow::bail!("search.pool_size must be >= 1");
    }
    if config.search.timeout_secs < 1 {
        anyhow::bail!("search.timeout_secs must be >= 1");
    }

    // Validate limits
    if config.limits.max_read_chars < 1 {
        anyhow::bail!("limits.max_read_chars must be >= 1");
    }
    if config.limits.max_output_bytes < 1 {
        anyhow::bail!("limits.max_output_bytes must be >= 1");
    }

    // Validate policy
    config
        .filters
        .policy
        .build()
        .with_context(|| "Invalid filters.policy")?;

    // Validate filter specs
    let mut seen = std::collections::BTreeSet::new();
    for spec in &config.filters.spec {
        if spec.extensions.is_empty() {
            anyhow::bail!("filters.spec entries must declare at least one extension");
        }
        let label = spec.extensions.join(",");
        if !spec.command.is_empty() && !spec.command.iter().any(|a| a.contains("{path}")) {
            anyhow::bail!("filters.spec [{label}]: command must reference {{path}}");
        }
        if spec.command.is_empty() && !spec.page_args.is_empty() {
            anyhow::bail!("filters.spec [{label}]: page_args require a command");
        }
        if !spec.page_args.is_empty()
            && !spec
                .page_args
                .iter()
                .any(|a| a.contains("{first}") || a.contains("{last}"))
        {
            anyhow::bail!("filters.spec [{label}]: page_args must reference {{first}} or {{last}}");
        }
        if !spec.info_command.is_empty() && !spec.info_command.iter().any(|a| a.contains("{path}"))
        {
            anyhow::bail!("filters.spec [{label}]: info_command must reference {{path}}");
        }
        if spec.timeout_secs == 0 {
            anyhow::bail!("filters.spec [{label}]: timeout_secs must be >= 1");
        }
        for extension in &spec.extensions {
            if !seen.insert(extension.trim_start_matches('.').to_ascii_lowercase()) {
                anyhow::bail!("Duplicate filter extension: '{}'", extension);
            }
        }
    }

    Ok(config)
}
