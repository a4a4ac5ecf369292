//! Document content retrieval.
//!
//! Reads a document through its configured filter (or directly for plain
//! text formats) and writes the content to stdout, keeping notes on stderr
//! so the output stays pipeable. Used by the `docfort read` CLI command.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;

/// CLI entry point — prints document content to stdout.
pub async fn run_read(
    config: &Config,
    path: &str,
    first_page: Option<u32>,
    last_page: Option<u32>,
) -> Result<()> {
    let pages = match (first_page, last_page) {
        (Some(first), Some(last)) => Some((first, last)),
        (None, None) => None,
        _ => {
            eprintln!("Error: --first-page and --last-page must be given together");
            std::process::exit(2);
        }
    };

    let knowledge = KnowledgeBase::new(config)?;
    let doc = match knowledge.read_document(path, pages).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    print!("{}", doc.content);
    if !doc.content.ends_with('\n') {
        println!();
    }
    if let (Some(first), Some(last)) = (doc.first_page, doc.last_page) {
        eprintln!("(pages {}-{} of {})", first, last, doc.path);
    }
    if doc.truncated {
        eprintln!("(output truncated)");
    }
    Ok(())
}
