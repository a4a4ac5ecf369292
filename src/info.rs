//! Document metadata inspection.
//!
//! Prints size, timestamps, page count (when the format's filter can report
//! one) and the heading outline for plain text formats. Used by the
//! `docfort info` CLI command.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;

/// CLI entry point — prints document metadata and outline.
pub async fn run_info(config: &Config, path: &str) -> Result<()> {
    let knowledge = KnowledgeBase::new(config)?;
    let info = match knowledge.document_info(path).await {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Document ---");
    println!("path:      {}", info.path);
    println!("name:      {}", info.name);
    println!("format:    {}", info.format);
    println!("size:      {} bytes", info.size_bytes);
    println!("modified:  {}", info.modified.format("%Y-%m-%dT%H:%M:%SZ"));
    if let Some(pages) = info.page_count {
        println!("pages:     {}", pages);
    }

    if !info.outline.is_empty() {
        println!();
        println!("--- Outline ---");
        for entry in &info.outline {
            let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
            println!("{}{} (line {})", indent, entry.title, entry.line);
        }
    }
    Ok(())
}
