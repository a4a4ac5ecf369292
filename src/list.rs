//! Collection listing.
//!
//! Shows the sub-collections and documents directly under one level of the
//! knowledge tree. Used by the `docfort list` CLI command; the same facade
//! call backs the `list_collections` tool.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;

/// CLI entry point — prints one level of the knowledge tree.
pub fn run_list(config: &Config, path: &str) -> Result<()> {
    let knowledge = KnowledgeBase::new(config)?;
    let listing = match knowledge.list_collections(path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", listing.path);
    if listing.collections.is_empty() && listing.documents.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    for name in &listing.collections {
        println!("  {}/", name);
    }
    for name in &listing.documents {
        println!("  {}", name);
    }
    Ok(())
}
