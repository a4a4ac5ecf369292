//! Document access facade.
//!
//! [`KnowledgeBase`] binds the validator, filter registry, executor, search
//! backend, limiter and cache into the public read-only operations: listing,
//! lookup, reading, metadata and search. Every path argument is validated
//! before any filesystem walk or subprocess spawn, and every result is
//! shaped and capped here so callers never see raw backend or filter
//! output.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use globset::GlobBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::{SearchBackend, SearchResult};
use crate::cache::{CacheStats, SearchCache};
use crate::config::Config;
use crate::errors::{AccessError, FilterError, PathError, SearchError};
use crate::exec::{ExecRequest, ExecutionResult, SandboxedExecutor};
use crate::filters::{program_name, FilterMode, FilterPolicy, FilterRegistry, FilterSpec};
use crate::limiter::SearchPool;
use crate::paths::{PathValidator, RootedPath};
use crate::query::{Scope, SearchQuery};

const MAX_CONTEXT_LINES: usize = 10;
const MAX_OUTLINE_ENTRIES: usize = 50;

// ============================================================================
// Result shapes
// ============================================================================

/// Immediate children of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionListing {
    pub path: String,
    pub collections: Vec<String>,
    pub documents: Vec<String>,
}

/// One filename-lookup result.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHit {
    pub path: String,
    pub name: String,
    pub format: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Extracted document content.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContent {
    pub path: String,
    pub format: String,
    pub content: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlineEntry {
    pub level: u8,
    pub title: String,
    pub line: u64,
}

/// Document metadata without full content.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub path: String,
    pub name: String,
    pub format: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outline: Vec<OutlineEntry>,
}

// ============================================================================
// Facade
// ============================================================================

/// Read-only gateway to the knowledge root.
pub struct KnowledgeBase {
    validator: PathValidator,
    filters: FilterRegistry,
    policy: FilterPolicy,
    executor: SandboxedExecutor,
    backend: SearchBackend,
    pool: SearchPool,
    cache: SearchCache,
    max_read_chars: usize,
    max_output_bytes: usize,
    default_max_results: usize,
    default_context_lines: usize,
}

impl KnowledgeBase {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let validator = PathValidator::new(&config.knowledge.root, config.knowledge.follow_symlinks)
            .with_context(|| {
                format!(
                    "Failed to open knowledge root: {}",
                    config.knowledge.root.display()
                )
            })?;
        let policy = config.filters.policy.build()?;
        let filters = FilterRegistry::new(&config.filters.spec);
        let executor = SandboxedExecutor::new();
        let backend = SearchBackend::new(
            config.search.command.clone(),
            config.search_timeout(),
            config.limits.max_output_bytes,
            executor.clone(),
        );

        info!(
            root = %validator.root().display(),
            formats = filters.len(),
            policy = policy.mode_name(),
            pool = config.search.pool_size,
            "knowledge base ready"
        );

        Ok(Self {
            validator,
            filters,
            policy,
            executor,
            backend,
            pool: SearchPool::new(config.search.pool_size),
            cache: SearchCache::new(config.search.cache_size, config.cache_ttl()),
            max_read_chars: config.limits.max_read_chars,
            max_output_bytes: config.limits.max_output_bytes,
            default_max_results: config.search.max_results,
            default_context_lines: config.search.context_lines,
        })
    }

    pub fn root(&self) -> &Path {
        self.validator.root()
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Builds a search scope from optional collection/document arguments.
    pub fn scope(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
    ) -> Result<Scope, AccessError> {
        match (collection, document) {
            (Some(_), Some(_)) => Err(SearchError::QuerySyntax(
                "scope cannot name both a collection and a document".to_string(),
            )
            .into()),
            (None, Some(document)) => {
                let rooted = self.validator.validate_existing(document)?;
                self.require_file(&rooted)?;
                Ok(Scope::Document(rooted))
            }
            (Some(collection), None) => {
                let rooted = self.validator.validate_existing(normalize_root_arg(collection))?;
                self.require_dir(&rooted)?;
                Ok(Scope::Collection(rooted))
            }
            (None, None) => Ok(Scope::Global),
        }
    }

    // ------------------------------------------------------------------
    // Listing and lookup
    // ------------------------------------------------------------------

    /// Immediate children of a collection. Dot entries are skipped and only
    /// documents with a registered format are listed.
    pub fn list_collections(&self, path: &str) -> Result<CollectionListing, AccessError> {
        let rooted = self
            .validator
            .validate_existing(normalize_root_arg(path))?;
        self.require_dir(&rooted)?;

        let mut collections = Vec::new();
        let mut documents = Vec::new();
        for entry in std::fs::read_dir(rooted.absolute())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            let file_type = if file_type.is_symlink() {
                if !self.validator.follow_symlinks() {
                    continue;
                }
                match std::fs::metadata(entry.path()) {
                    Ok(metadata) => metadata.file_type(),
                    Err(_) => continue,
                }
            } else {
                file_type
            };
            if file_type.is_dir() {
                collections.push(name);
            } else if file_type.is_file() {
                if let Some(extension) = extension_of(&entry.path()) {
                    if self.filters.supports(&extension) {
                        documents.push(name);
                    }
                }
            }
        }
        collections.sort();
        documents.sort();

        Ok(CollectionListing {
            path: rooted.label(),
            collections,
            documents,
        })
    }

    /// Filename lookup under the whole root. The pattern is a glob when it
    /// contains glob metacharacters, a case-insensitive substring otherwise.
    /// Order is deterministic (relative path), capped at `limit`.
    pub fn find_documents(
        &self,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<DocumentHit>, AccessError> {
        let pattern = pattern.trim();
        if pattern.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let glob = if pattern.contains(['*', '?', '[']) {
            Some(
                GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        SearchError::QuerySyntax(format!("bad name pattern '{pattern}': {err}"))
                    })?
                    .compile_matcher(),
            )
        } else {
            None
        };
        let needle = pattern.to_lowercase();

        let mut hits = Vec::new();
        let walker = WalkDir::new(self.root())
            .follow_links(self.validator.follow_symlinks())
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_name().to_string_lossy().starts_with('.')
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(format) = extension_of(entry.path()) else {
                continue;
            };
            if !self.filters.supports(&format) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let matched = match &glob {
                Some(glob) => glob.is_match(&name),
                None => name.to_lowercase().contains(&needle),
            };
            if !matched {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            let relative = entry
                .path()
                .strip_prefix(self.root())
                .unwrap_or(entry.path())
                .display()
                .to_string();
            hits.push(DocumentHit {
                path: relative,
                name,
                format,
                size_bytes: metadata.len(),
                modified: modified_time(&metadata),
            });
        }

        hits.sort_by(|a, b| a.path.cmp(&b.path));
        hits.truncate(limit);
        Ok(hits)
    }

    // ------------------------------------------------------------------
    // Reading and metadata
    // ------------------------------------------------------------------

    /// Full document content through the registered filter, with the
    /// character ceiling applied after extraction. Formats whose filter has
    /// no page arguments reject page ranges.
    pub async fn read_document(
        &self,
        path: &str,
        pages: Option<(u32, u32)>,
    ) -> Result<DocumentContent, AccessError> {
        let rooted = self.validator.validate_existing(path)?;
        self.require_file(&rooted)?;
        let format = self.format_of(&rooted)?;
        let spec = self.filters.resolve(&format)?;

        let pages = match pages {
            Some(range) => {
                if !spec.supports_pages() {
                    return Err(FilterError::UnsupportedFormat(format!(
                        "{format} does not support page ranges"
                    ))
                    .into());
                }
                Some(clamp_pages(range))
            }
            None => None,
        };

        let (content, stream_truncated) = if spec.is_direct() {
            let bytes = tokio::fs::read(rooted.absolute()).await?;
            (decode(bytes, spec.mode, &rooted), false)
        } else {
            let argv = spec.render(Path::new(&safe_relative(&rooted)), pages);
            let result = self.run_filter(spec, &spec.command, argv).await?;
            (decode(result.stdout, spec.mode, &rooted), result.truncated)
        };

        let (content, capped) = self.enforce_char_ceiling(content);
        debug!(path = %rooted, format = %format, chars = content.chars().count(), "document read");

        Ok(DocumentContent {
            path: rooted.to_string(),
            format,
            content,
            truncated: stream_truncated || capped,
            first_page: pages.map(|p| p.0),
            last_page: pages.map(|p| p.1),
        })
    }

    /// Size, timestamps and structure without full content. The page count
    /// comes from the filter's info command when one is declared; the
    /// outline is parsed from heading lines of directly readable formats.
    pub async fn document_info(&self, path: &str) -> Result<DocumentInfo, AccessError> {
        let rooted = self.validator.validate_existing(path)?;
        self.require_file(&rooted)?;
        let metadata = std::fs::metadata(rooted.absolute())?;
        let format = self.format_of(&rooted)?;
        let name = rooted
            .relative()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut page_count = None;
        let mut outline = Vec::new();
        if let Ok(spec) = self.filters.resolve(&format) {
            if spec.has_info_command() {
                match self.policy.authorize(&spec.info_command) {
                    Ok(()) => {
                        let argv = spec.render_info(Path::new(&safe_relative(&rooted)));
                        let result = self.run_filter(spec, &spec.info_command, argv).await?;
                        page_count = parse_page_count(&String::from_utf8_lossy(&result.stdout));
                    }
                    Err(denied) => {
                        warn!(path = %rooted, error = %denied, "info command not authorized, skipping");
                    }
                }
            }
            if spec.is_direct() {
                let bytes = tokio::fs::read(rooted.absolute()).await?;
                outline = parse_outline(&String::from_utf8_lossy(&bytes));
            }
        }

        Ok(DocumentInfo {
            path: rooted.to_string(),
            name,
            format,
            size_bytes: metadata.len(),
            modified: modified_time(&metadata),
            page_count,
            outline,
        })
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// One search through cache, limiter and backend.
    pub async fn search_documents(
        &self,
        terms: &str,
        scope: Scope,
        max_results: Option<usize>,
        context_lines: Option<usize>,
    ) -> Result<SearchResult, AccessError> {
        let max_results = max_results
            .unwrap_or(self.default_max_results)
            .clamp(1, self.default_max_results);
        let context_lines = context_lines
            .unwrap_or(self.default_context_lines)
            .min(MAX_CONTEXT_LINES);
        let query = SearchQuery::new(terms, scope, max_results, context_lines)?;

        if let Some(hit) = self.cache.get(&query) {
            return Ok(hit);
        }

        let slot = self.pool.acquire().await;
        let result = self.backend.search(&query, self.root()).await?;
        drop(slot);

        self.cache.store(&query, &result);
        Ok(result)
    }

    /// Fan-out over the shared pool. Failures are isolated per query and
    /// results come back keyed by query, in input order.
    pub async fn search_multiple(
        &self,
        queries: &[String],
        scope: Scope,
    ) -> Vec<(String, Result<SearchResult, AccessError>)> {
        let jobs = queries.iter().map(|terms| {
            let scope = scope.clone();
            async move {
                (
                    terms.clone(),
                    self.search_documents(terms, scope, None, None).await,
                )
            }
        });
        join_all(jobs).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Runs one rendered filter command. The template is authorized against
    /// the policy on every invocation, never once-and-cached.
    async fn run_filter(
        &self,
        spec: &FilterSpec,
        template: &[String],
        argv: Vec<String>,
    ) -> Result<ExecutionResult, AccessError> {
        self.policy.authorize(template)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| FilterError::FilterDenied(program_name(template)))?;

        let mut request = ExecRequest::new(program.clone(), args.to_vec());
        request.current_dir = Some(self.root().to_path_buf());
        request.timeout = Duration::from_secs(spec.timeout_secs);
        request.max_output_bytes = self.max_output_bytes;
        let result = self.executor.run(&request).await?;
        Ok(result)
    }

    fn format_of(&self, rooted: &RootedPath) -> Result<String, AccessError> {
        extension_of(rooted.relative())
            .ok_or_else(|| FilterError::UnsupportedFormat(rooted.to_string()).into())
    }

    fn require_file(&self, rooted: &RootedPath) -> Result<(), AccessError> {
        let metadata = std::fs::metadata(rooted.absolute())?;
        if !metadata.is_file() {
            return Err(PathError::NotFound(format!("{rooted} (not a document)")).into());
        }
        Ok(())
    }

    fn require_dir(&self, rooted: &RootedPath) -> Result<(), AccessError> {
        let metadata = std::fs::metadata(rooted.absolute())?;
        if !metadata.is_dir() {
            return Err(PathError::NotFound(format!("{rooted} (not a collection)")).into());
        }
        Ok(())
    }

    /// Cuts content at the configured character count. The cut lands on a
    /// char boundary, so the same input always yields the same output.
    fn enforce_char_ceiling(&self, mut content: String) -> (String, bool) {
        match content.char_indices().nth(self.max_read_chars) {
            Some((byte_index, _)) => {
                content.truncate(byte_index);
                (content, true)
            }
            None => (content, false),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Empty and `/` both mean the root itself.
fn normalize_root_arg(path: &str) -> &str {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        "."
    } else {
        trimmed
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Relative argv form that a child cannot mistake for a flag.
fn safe_relative(rooted: &RootedPath) -> String {
    let shown = rooted.relative().display().to_string();
    if shown.starts_with('-') {
        format!("./{shown}")
    } else {
        shown
    }
}

fn clamp_pages((first, last): (u32, u32)) -> (u32, u32) {
    let first = first.max(1);
    let last = last.max(first);
    (first, last)
}

fn decode(bytes: Vec<u8>, mode: FilterMode, rooted: &RootedPath) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            if mode == FilterMode::Text {
                warn!(path = %rooted, "text output was not valid UTF-8, decoding leniently");
            }
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

/// Page count from `pdfinfo`-style `Pages:` output.
fn parse_page_count(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        line.strip_prefix("Pages:")
            .and_then(|rest| rest.trim().parse().ok())
    })
}

/// Heading outline of `#`-structured text, capped. Hashes must be followed
/// by whitespace, so `#hashtag` lines are not headings.
fn parse_outline(content: &str) -> Vec<OutlineEntry> {
    let mut outline = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
        if hashes == 0 || hashes > 6 {
            continue;
        }
        let rest = &trimmed[hashes..];
        if !rest.starts_with([' ', '\t']) {
            continue;
        }
        let title = rest.trim();
        if title.is_empty() {
            continue;
        }
        outline.push(OutlineEntry {
            level: hashes as u8,
            title: title.to_string(),
            line: index as u64 + 1,
        });
        if outline.len() >= MAX_OUTLINE_ENTRIES {
            break;
        }
    }
    outline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FiltersConfig, KnowledgeConfig, LimitsConfig, PolicyConfig, SearchConfig, ServerConfig,
    };
    use crate::errors::ExecutionError;
    use tempfile::TempDir;

    fn seed_root(dir: &TempDir) {
        let root = dir.path();
        std::fs::create_dir(root.join("docs")).unwrap();
        std::fs::create_dir(root.join("guides")).unwrap();
        std::fs::write(
            root.join("docs/combat.md"),
            "# Combat\n\nAttack rolls use armor class.\n\n## Modifiers\n\nCover grants +2.\n",
        )
        .unwrap();
        std::fs::write(root.join("guides/setup.md"), "# Setup\n\nInstall the app.\n").unwrap();
        std::fs::write(root.join("readme.txt"), "Top level notes.\n").unwrap();
        std::fs::write(root.join(".hidden.md"), "secret\n").unwrap();
        std::fs::write(root.join("raw.xyz"), "unsupported\n").unwrap();
    }

    fn config(root: &std::path::Path, backend: &str) -> Config {
        Config {
            knowledge: KnowledgeConfig {
                root: root.to_path_buf(),
                follow_symlinks: false,
            },
            search: SearchConfig {
                command: backend.to_string(),
                ..SearchConfig::default()
            },
            limits: LimitsConfig::default(),
            filters: FiltersConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn knowledge(dir: &TempDir) -> KnowledgeBase {
        seed_root(dir);
        KnowledgeBase::new(&config(dir.path(), "true")).unwrap()
    }

    #[cfg(unix)]
    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn lists_root_collections_and_documents() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let listing = kb.list_collections("").unwrap();
        assert_eq!(listing.path, "/");
        assert_eq!(listing.collections, vec!["docs", "guides"]);
        assert_eq!(listing.documents, vec!["readme.txt"]);
    }

    #[test]
    fn listing_a_document_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let err = kb.list_collections("readme.txt").unwrap_err();
        assert!(matches!(err, AccessError::Path(PathError::NotFound(_))));
    }

    #[test]
    fn finds_documents_by_substring_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let hits = kb.find_documents("SETUP", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "guides/setup.md");
        assert_eq!(hits[0].format, "md");
        assert!(hits[0].size_bytes > 0);
    }

    #[test]
    fn finds_documents_by_glob() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let hits = kb.find_documents("*.md", 10).unwrap();
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/combat.md", "guides/setup.md"]);

        let capped = kb.find_documents("*.md", 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn hidden_and_unsupported_files_are_invisible() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        assert!(kb.find_documents("hidden", 10).unwrap().is_empty());
        assert!(kb.find_documents("*.xyz", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_a_plain_text_document_directly() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let content = kb.read_document("docs/combat.md", None).await.unwrap();
        assert_eq!(content.format, "md");
        assert!(content.content.contains("Attack rolls"));
        assert!(!content.truncated);
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected_before_any_read() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let err = kb.read_document("../etc/passwd", None).await.unwrap_err();
        assert!(matches!(err, AccessError::Path(PathError::Traversal(_))));
    }

    #[tokio::test]
    async fn missing_and_unsupported_documents_fail_cleanly() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let err = kb.read_document("docs/absent.md", None).await.unwrap_err();
        assert!(matches!(err, AccessError::Path(PathError::NotFound(_))));

        let err = kb.read_document("raw.xyz", None).await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::Filter(FilterError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn truncated_reads_are_deterministic() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        let mut cfg = config(dir.path(), "true");
        cfg.limits.max_read_chars = 10;
        let kb = KnowledgeBase::new(&cfg).unwrap();

        let first = kb.read_document("docs/combat.md", None).await.unwrap();
        let second = kb.read_document("docs/combat.md", None).await.unwrap();
        assert!(first.truncated);
        assert_eq!(first.content, second.content);
        assert_eq!(first.content.chars().count(), 10);
    }

    #[tokio::test]
    async fn page_ranges_need_a_paginated_format() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let err = kb
            .read_document("docs/combat.md", Some((1, 2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Filter(FilterError::UnsupportedFormat(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn filtered_formats_run_their_configured_command() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        std::fs::write(dir.path().join("docs/manual.pdf"), b"%PDF-fake").unwrap();
        let filter = write_script(&dir, "fake-extract.sh", "echo 'extracted body'");

        let mut cfg = config(dir.path(), "true");
        cfg.filters = FiltersConfig {
            policy: PolicyConfig {
                mode: "whitelist".to_string(),
                allow: vec!["fake-extract.sh".to_string()],
                deny: Vec::new(),
            },
            spec: vec![FilterSpec {
                extensions: vec!["pdf".to_string()],
                command: vec![filter, "{path}".to_string()],
                page_args: Vec::new(),
                mode: FilterMode::Text,
                timeout_secs: 5,
                info_command: Vec::new(),
            }],
        };
        let kb = KnowledgeBase::new(&cfg).unwrap();

        let content = kb.read_document("docs/manual.pdf", None).await.unwrap();
        assert_eq!(content.content.trim(), "extracted body");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unauthorized_filters_never_spawn() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        std::fs::write(dir.path().join("docs/manual.pdf"), b"%PDF-fake").unwrap();
        let marker = dir.path().join("filter-ran.marker");
        let filter = write_script(
            &dir,
            "fake-extract.sh",
            &format!("touch {}\necho extracted", marker.display()),
        );

        let mut cfg = config(dir.path(), "true");
        cfg.filters = FiltersConfig {
            policy: PolicyConfig {
                mode: "whitelist".to_string(),
                allow: vec!["pdftotext".to_string()],
                deny: Vec::new(),
            },
            spec: vec![FilterSpec {
                extensions: vec!["pdf".to_string()],
                command: vec![filter, "{path}".to_string()],
                page_args: Vec::new(),
                mode: FilterMode::Text,
                timeout_secs: 5,
                info_command: Vec::new(),
            }],
        };
        let kb = KnowledgeBase::new(&cfg).unwrap();

        let err = kb.read_document("docs/manual.pdf", None).await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::Filter(FilterError::FilterDenied(_))
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn document_info_reports_outline_and_metadata() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);

        let info = kb.document_info("docs/combat.md").await.unwrap();
        assert_eq!(info.name, "combat.md");
        assert_eq!(info.format, "md");
        assert!(info.size_bytes > 0);
        assert!(info.page_count.is_none());
        assert_eq!(info.outline.len(), 2);
        assert_eq!(info.outline[0].title, "Combat");
        assert_eq!(info.outline[0].level, 1);
        assert_eq!(info.outline[1].title, "Modifiers");
        assert_eq!(info.outline[1].line, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn document_info_uses_the_info_command_for_page_counts() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        std::fs::write(dir.path().join("docs/manual.pdf"), b"%PDF-fake").unwrap();
        let info_cmd = write_script(&dir, "fake-info.sh", "echo 'Title: Manual'\necho 'Pages: 42'");

        let mut cfg = config(dir.path(), "true");
        cfg.filters = FiltersConfig {
            policy: PolicyConfig {
                mode: "whitelist".to_string(),
                allow: vec!["cat".to_string(), "fake-info.sh".to_string()],
                deny: Vec::new(),
            },
            spec: vec![FilterSpec {
                extensions: vec!["pdf".to_string()],
                command: vec!["cat".to_string(), "{path}".to_string()],
                page_args: Vec::new(),
                mode: FilterMode::Text,
                timeout_secs: 5,
                info_command: vec![info_cmd, "{path}".to_string()],
            }],
        };
        let kb = KnowledgeBase::new(&cfg).unwrap();

        let info = kb.document_info("docs/manual.pdf").await.unwrap();
        assert_eq!(info.page_count, Some(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn single_match_search_end_to_end() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        let backend = write_script(
            &dir,
            "fake-search.sh",
            "echo 'docs/combat.md:3:Attack rolls use armor class.'",
        );
        let kb = KnowledgeBase::new(&config(dir.path(), &backend)).unwrap();

        let result = kb
            .search_documents("attack armor", Scope::Global, None, None)
            .await
            .unwrap();
        assert_eq!(result.total_matches, 1);
        assert_eq!(result.matches[0].path, "docs/combat.md");
        assert!(!result.truncated);

        // Second identical search is served from the cache.
        kb.search_documents("attack armor", Scope::Global, None, None)
            .await
            .unwrap();
        assert_eq!(kb.cache_stats().total_hits, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fan_out_isolates_per_query_failures() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        let backend = write_script(&dir, "fake-search.sh", "echo 'docs/combat.md:3:hit'");
        let kb = KnowledgeBase::new(&config(dir.path(), &backend)).unwrap();

        let outcomes = kb
            .search_multiple(
                &["attack".to_string(), "\"unbalanced".to_string()],
                Scope::Global,
            )
            .await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "attack");
        assert!(outcomes[0].1.is_ok());
        assert!(matches!(
            outcomes[1].1.as_ref().unwrap_err(),
            AccessError::Search(SearchError::QuerySyntax(_))
        ));
    }

    #[tokio::test]
    async fn scoped_search_rejects_missing_collections() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let err = kb.scope(Some("absent"), None).unwrap_err();
        assert!(matches!(err, AccessError::Path(PathError::NotFound(_))));

        let scope = kb.scope(Some("docs"), None).unwrap();
        assert_eq!(scope.label(), "docs");
    }

    #[tokio::test]
    async fn backend_spawn_failure_surfaces_as_execution_error() {
        let dir = TempDir::new().unwrap();
        seed_root(&dir);
        let kb = KnowledgeBase::new(&config(dir.path(), "docfort-missing-backend")).unwrap();
        let err = kb
            .search_documents("attack", Scope::Global, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Execution(ExecutionError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn outline_parsing_caps_and_levels() {
        let outline = parse_outline("# A\ntext\n### Deep\n####### too deep\n#norun\n");
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].level, 1);
        assert_eq!(outline[1].level, 3);
        assert_eq!(outline[1].line, 3);
    }

    #[test]
    fn page_clamping_is_order_preserving() {
        assert_eq!(clamp_pages((0, 3)), (1, 3));
        assert_eq!(clamp_pages((5, 2)), (5, 5));
    }

    #[test]
    fn pdfinfo_page_lines_parse() {
        assert_eq!(parse_page_count("Title: x\nPages:          12\n"), Some(12));
        assert_eq!(parse_page_count("no pages here"), None);
    }
}
