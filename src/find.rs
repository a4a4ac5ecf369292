//! Document lookup by name or glob pattern.
//!
//! Walks the knowledge tree and matches document names case-insensitively,
//! as a literal substring or as a glob when the pattern contains wildcard
//! characters. Used by the `docfort find` CLI command; the same facade call
//! backs the `find_document` tool.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;

/// CLI entry point — finds documents by name and prints one line per hit.
pub fn run_find(config: &Config, pattern: &str, limit: usize) -> Result<()> {
    let knowledge = KnowledgeBase::new(config)?;
    let hits = match knowledge.find_documents(pattern, limit) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if hits.is_empty() {
        println!("No documents matched '{}'.", pattern);
        return Ok(());
    }

    for hit in &hits {
        println!(
            "{}  ({}, {} bytes, {})",
            hit.path,
            hit.format,
            hit.size_bytes,
            hit.modified.format("%Y-%m-%d")
        );
    }
    println!();
    println!("{} document(s).", hits.len());
    Ok(())
}
