//! # Docfort
//!
//! **A sandboxed, read-only document access and search server for AI tools.**
//!
//! Docfort gives an AI agent safe access to a local document folder. Every
//! path is contained inside one knowledge root, every extraction filter is
//! checked against a command policy, every subprocess runs with a wall-clock
//! timeout, a minimal environment and bounded output, and full-text search
//! fans out over an external `ugrep`-style backend under a fixed concurrency
//! budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │   CLI    │   │ HTTP (Axum)  │   │ MCP (rmcp) │
//! │(docfort) │   │ /tools/{name}│   │   /mcp     │
//! └────┬─────┘   └──────┬───────┘   └─────┬──────┘
//!      └──────────┬─────┴─────────────────┘
//!                 ▼
//!         ┌───────────────┐
//!         │ KnowledgeBase │  containment, policy, cache
//!         └──────┬────────┘
//!       ┌────────┼────────────┐
//!       ▼        ▼            ▼
//! ┌──────────┐ ┌──────────┐ ┌─────────────┐
//! │ filters  │ │ backend  │ │ search pool │
//! │ + exec   │ │ (ugrep)  │ │ (semaphore) │
//! └──────────┘ └──────────┘ └─────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. Requests arrive through the **CLI** (`docfort`), the **HTTP API**
//!    ([`server`]), or the **MCP endpoint** ([`mcp`]); all three dispatch
//!    through the same [`tools::ToolRegistry`].
//! 2. Every caller-supplied path is normalized and contained by
//!    [`paths::PathValidator`], including a bounded walk over symlinks.
//! 3. Reads resolve an extraction filter in [`filters::FilterRegistry`],
//!    authorize its command against the [`filters::FilterPolicy`], and run
//!    it via [`exec::SandboxedExecutor`] with timeout and output caps.
//! 4. Searches compile a Boolean [`query::SearchQuery`] into a backend
//!    invocation ([`backend::SearchBackend`]), bounded by the
//!    [`limiter::SearchPool`] and memoized by the [`cache::SearchCache`].
//! 5. Results serialize as JSON and flow back out unchanged through the
//!    tool, HTTP, and MCP layers.
//!
//! ## Quick Start
//!
//! ```bash
//! docfort list                       # top-level collections
//! docfort find "races*"              # locate documents by name
//! docfort search "dwarf OR elf"      # Boolean full-text search
//! docfort read rules/combat.md       # print document content
//! docfort info rules/combat.md       # metadata and outline
//! docfort serve mcp                  # start HTTP + MCP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`errors`] | Error taxonomy: path, filter, execution, search |
//! | [`paths`] | Path containment: normalization, symlink walking |
//! | [`filters`] | Extraction filter specs, registry, and command policy |
//! | [`exec`] | Sandboxed subprocess execution with timeout and caps |
//! | [`query`] | Boolean search queries and search scopes |
//! | [`backend`] | External search backend invocation and output parsing |
//! | [`limiter`] | Fixed-size concurrency pool for search jobs |
//! | [`cache`] | TTL cache for search results |
//! | [`knowledge`] | The facade: list, find, read, info, search |
//! | [`tools`] | Extension traits: `Tool`, `ToolContext`, `ToolRegistry` |
//! | [`resources`] | `knowledge://` resource URIs and JSON payloads |
//! | [`mcp`] | MCP JSON-RPC bridge (tools, resources, prompts) |
//! | [`server`] | MCP-compatible HTTP server (Axum) with CORS |
//! | [`list`] | `docfort list` command |
//! | [`find`] | `docfort find` command |
//! | [`search`] | `docfort search` command |
//! | [`read`] | `docfort read` command |
//! | [`info`] | `docfort info` command |
//! | [`filters_cmd`] | `docfort filters` command |
//!
//! ## Configuration
//!
//! Docfort is configured via a TOML file (default: `./docfort.toml`).
//! See [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod backend;
pub mod cache;
pub mod config;
pub mod errors;
pub mod exec;
pub mod filters;
pub mod filters_cmd;
pub mod find;
pub mod info;
pub mod knowledge;
pub mod limiter;
pub mod list;
pub mod mcp;
pub mod paths;
pub mod query;
pub mod read;
pub mod resources;
pub mod search;
pub mod server;
pub mod tools;

pub use backend::{MatchRecord, SearchResult};
pub use errors::{AccessError, ExecutionError, FilterError, PathError, SearchError};
pub use knowledge::KnowledgeBase;
pub use query::Scope;
pub use tools::{Tool, ToolContext, ToolRegistry};
