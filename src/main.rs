//! # Docfort CLI (`docfort`)
//!
//! The `docfort` binary is the primary interface for Docfort. It provides
//! commands for browsing the knowledge tree, finding and reading documents,
//! Boolean full-text search, filter inspection, and starting the MCP server.
//!
//! ## Usage
//!
//! ```bash
//! docfort --config ./docfort.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docfort list [PATH]` | List sub-collections and documents under a path |
//! | `docfort find <PATTERN>` | Find documents by name or glob pattern |
//! | `docfort search "<query>"` | Boolean full-text search over documents |
//! | `docfort read <PATH>` | Print document content (filtered formats included) |
//! | `docfort info <PATH>` | Show document metadata and outline |
//! | `docfort filters` | Show configured filters and the command policy |
//! | `docfort serve mcp` | Start the MCP-compatible HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Top-level collections
//! docfort list --config ./docfort.toml
//!
//! # Locate a document by glob
//! docfort find "races*.pdf" --config ./docfort.toml
//!
//! # Boolean search scoped to one collection
//! docfort search "dwarf NOT gnome" --collection rules --config ./docfort.toml
//!
//! # Read pages 10-12 of a PDF
//! docfort read rules/core.pdf --first-page 10 --last-page 12
//!
//! # Serve the tools to MCP clients
//! docfort serve mcp --config ./docfort.toml
//! ```

mod backend;
mod cache;
mod config;
mod errors;
mod exec;
mod filters;
mod filters_cmd;
mod find;
mod info;
mod knowledge;
mod limiter;
mod list;
mod mcp;
mod paths;
mod query;
mod read;
mod resources;
mod search;
mod server;
#[allow(dead_code)]
mod tools;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docfort CLI — a sandboxed, read-only document access and search server
/// for AI tools.
///
/// Every command reads the same TOML configuration, located by the
/// global `--config` flag. `docfort.example.toml` documents all keys.
#[derive(Parser)]
#[command(
    name = "docfort",
    about = "A sandboxed, read-only document access and search server for AI tools",
    version,
    long_about = "Docfort gives AI agents safe access to a local document folder: paths are \
    contained inside one knowledge root, extraction filters are checked against a command \
    policy, subprocesses run with timeouts and bounded output, and Boolean full-text search \
    runs over an external ugrep-style backend under a fixed concurrency budget."
)]
struct Cli {
    /// TOML configuration file.
    ///
    /// Defaults to `./docfort.toml`. Holds the knowledge root, search
    /// backend, extraction filters, and server settings.
    #[arg(long, global = true, default_value = "./docfort.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List one level of the knowledge tree.
    ///
    /// Shows the sub-collections and supported documents directly under
    /// PATH, or under the knowledge root when PATH is omitted. Hidden
    /// entries and unsupported formats are excluded.
    List {
        /// Collection path relative to the knowledge root.
        path: Option<String>,
    },

    /// Find documents by name.
    ///
    /// Matches case-insensitively against document file names, as a literal
    /// substring or as a glob when the pattern contains `*`, `?` or `[`.
    Find {
        /// Name fragment or glob pattern (e.g. `races*.pdf`).
        pattern: String,

        /// Maximum number of hits to return.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Search documents with a Boolean query.
    ///
    /// Terms are ANDed; `OR`, `NOT` and "quoted phrases" pass through to
    /// the backend. Matching is case-insensitive and recursive from the
    /// search scope.
    Search {
        /// Boolean search expression.
        query: String,

        /// Restrict the search to one collection.
        #[arg(long, conflicts_with = "document")]
        collection: Option<String>,

        /// Restrict the search to one document.
        #[arg(long)]
        document: Option<String>,

        /// Maximum number of matches (capped by `[search].max_results`).
        #[arg(long)]
        max_results: Option<usize>,

        /// Context lines before and after each match.
        #[arg(long)]
        context: Option<usize>,
    },

    /// Print a document's content.
    ///
    /// Plain text formats are read directly; other formats run through
    /// their configured extraction filter. Content beyond the character
    /// ceiling is truncated.
    Read {
        /// Document path relative to the knowledge root.
        path: String,

        /// First page of a page range (paginated formats only).
        #[arg(long)]
        first_page: Option<u32>,

        /// Last page of a page range (paginated formats only).
        #[arg(long)]
        last_page: Option<u32>,
    },

    /// Show document metadata.
    ///
    /// Prints size, modification time, page count (when the format's
    /// filter reports one) and the heading outline for plain text formats.
    Info {
        /// Document path relative to the knowledge root.
        path: String,
    },

    /// Show configured extraction filters and the command policy.
    Filters,

    /// Start the MCP-compatible HTTP server.
    ///
    /// Exposes the knowledge base via a JSON API and an MCP JSON-RPC
    /// endpoint for integration with Cursor, Claude, and other AI tools.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Serve the tool routes and MCP endpoint on `[server].bind`.
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::List { path } => {
            list::run_list(&cfg, path.as_deref().unwrap_or(""))?;
        }
        Commands::Find { pattern, limit } => {
            find::run_find(&cfg, &pattern, limit)?;
        }
        Commands::Search {
            query,
            collection,
            document,
            max_results,
            context,
        } => {
            search::run_search(&cfg, &query, collection, document, max_results, context).await?;
        }
        Commands::Read {
            path,
            first_page,
            last_page,
        } => {
            read::run_read(&cfg, &path, first_page, last_page).await?;
        }
        Commands::Info { path } => {
            info::run_info(&cfg, &path).await?;
        }
        Commands::Filters => {
            filters_cmd::run_filters(&cfg)?;
        }
        Commands::Serve { service } => match service {
            ServeService::Mcp => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
