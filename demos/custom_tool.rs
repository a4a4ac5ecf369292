//! Example: custom docfort binary with a Rust tool extension.
//!
//! Demonstrates building a custom binary that extends docfort with a
//! **`CollectionStatsTool`** that walks the knowledge base and returns
//! per-collection document statistics. Custom tools go through the same
//! [`ToolContext`] facade as the built-ins, so path containment, the
//! filter policy and the read limits all still apply.
//!
//! # Running
//!
//! ```bash
//! # 1. Create a knowledge root with a few documents
//! mkdir -p /tmp/kb/rules /tmp/kb/lore
//! echo '# Grappling' > /tmp/kb/rules/grappling.md
//! echo '# The Old Kingdom' > /tmp/kb/lore/kingdom.md
//! echo 'Start with the rules collection.' > /tmp/kb/readme.txt
//!
//! # 2. Point a config at it
//! cat > /tmp/docfort.toml << 'EOF'
//! [knowledge]
//! root = "/tmp/kb"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! EOF
//!
//! # 3. Print the stats directly, no server involved
//! cargo run --example custom_tool -- --config /tmp/docfort.toml stats
//!
//! # 4. Or serve it next to the built-in tools
//! cargo run --example custom_tool -- --config /tmp/docfort.toml serve
//!
//! # 5. In another terminal, call it over HTTP
//! curl -s http://localhost:7341/tools/list | jq .
//! curl -s -X POST http://localhost:7341/tools/collection_stats \
//!   -H 'Content-Type: application/json' -d '{}' | jq .
//! ```

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use docfort::config;
use docfort::knowledge::KnowledgeBase;
use docfort::server::run_server_with_extensions;
use docfort::tools::{Tool, ToolContext, ToolRegistry};

// ============ Collection stats tool ============

/// A tool that tallies documents and bytes per top-level collection.
///
/// Agents can call this to understand the shape of the knowledge base
/// before searching it. This demonstrates how to implement the [`Tool`]
/// trait with [`ToolContext`] access.
struct CollectionStatsTool;

#[async_trait]
impl Tool for CollectionStatsTool {
    fn name(&self) -> &str {
        "collection_stats"
    }

    fn description(&self) -> &str {
        "Tally documents and sizes per collection in the knowledge base"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        // Every supported document in the root, with sizes.
        let hits = ctx.knowledge().find_documents("*", 10_000)?;

        let mut per_collection: BTreeMap<String, (usize, u64)> = BTreeMap::new();
        for hit in &hits {
            let collection = match hit.path.split_once('/') {
                Some((head, _)) => head.to_string(),
                None => "(root)".to_string(),
            };
            let entry = per_collection.entry(collection).or_default();
            entry.0 += 1;
            entry.1 += hit.size_bytes;
        }

        let collections: Vec<Value> = per_collection
            .iter()
            .map(|(name, (count, bytes))| {
                json!({
                    "collection": name,
                    "documents": count,
                    "bytes": bytes,
                })
            })
            .collect();

        Ok(json!({
            "total_documents": hits.len(),
            "total_bytes": hits.iter().map(|h| h.size_bytes).sum::<u64>(),
            "collections": collections,
        }))
    }
}

// ============ CLI ============

/// Custom docfort binary with the collection stats tool.
#[derive(Parser)]
#[command(name = "custom-docfort", about = "docfort with a custom stats tool")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, default_value = "./docfort.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print collection statistics to stdout.
    Stats,
    /// Start the HTTP/MCP server with the stats tool registered.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Stats => {
            let knowledge = Arc::new(KnowledgeBase::new(&cfg)?);
            let ctx = ToolContext::new(knowledge);
            let stats = CollectionStatsTool.execute(json!({}), &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Serve => {
            let mut tools = ToolRegistry::new();
            tools.register(Box::new(CollectionStatsTool));

            println!("Starting server with custom CollectionStatsTool...");
            run_server_with_extensions(&cfg, Arc::new(tools)).await?;
        }
    }

    Ok(())
}
