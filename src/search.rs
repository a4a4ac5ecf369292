//! Full-text search over the knowledge base.
//!
//! Builds a Boolean query, runs it through the external search backend
//! under the shared concurrency pool, and prints matches with their
//! context lines. Used by the `docfort search` CLI command; the same
//! facade call backs the `search_documents` tool.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;

/// CLI entry point — searches the knowledge base and prints matches.
pub async fn run_search(
    config: &Config,
    terms: &str,
    collection: Option<String>,
    document: Option<String>,
    max_results: Option<usize>,
    context: Option<usize>,
) -> Result<()> {
    let knowledge = KnowledgeBase::new(config)?;

    let outcome = async {
        let scope = knowledge.scope(collection.as_deref(), document.as_deref())?;
        knowledge
            .search_documents(terms, scope, max_results, context)
            .await
    }
    .await;

    let result = match outcome {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if result.matches.is_empty() {
        println!("No results.");
        if let Some(note) = &result.backend_error {
            eprintln!("Warning: {}", note);
        }
        return Ok(());
    }

    println!(
        "{} match(es) in {} for: {}",
        result.total_matches, result.searched_path, result.query
    );
    println!();

    for (i, m) in result.matches.iter().enumerate() {
        println!("{}. {}:{}", i + 1, m.path, m.line);
        for line in &m.before {
            println!("     | {}", line);
        }
        println!("   > | {}", m.text);
        for line in &m.after {
            println!("     | {}", line);
        }
        println!();
    }

    if result.truncated {
        println!("(capped at {} matches)", result.matches.len());
    }
    if let Some(note) = &result.backend_error {
        eprintln!("Warning: {}", note);
    }
    Ok(())
}
