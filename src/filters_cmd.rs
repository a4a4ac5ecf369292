use anyhow::Result;

use crate::config::Config;
use crate::filters::program_name;

/// Prints the configured extraction filters and the active command policy.
pub fn run_filters(config: &Config) -> Result<()> {
    let policy = config.filters.policy.build()?;

    println!("Policy: {}", policy.mode_name());
    let entries = policy.entries();
    if entries.is_empty() {
        println!("  (no entries)");
    } else {
        for entry in &entries {
            println!("  {}", entry);
        }
    }
    println!();

    println!("{:<18} {:<12} {:<6} COMMAND", "EXTENSIONS", "PROGRAM", "PAGES");
    for spec in &config.filters.spec {
        let extensions = spec.extensions.join(",");
        if spec.is_direct() {
            println!("{:<18} {:<12} {:<6} (read directly)", extensions, "-", "-");
        } else {
            println!(
                "{:<18} {:<12} {:<6} {}",
                extensions,
                program_name(&spec.command),
                if spec.supports_pages() { "yes" } else { "no" },
                spec.command.join(" ")
            );
        }
    }
    Ok(())
}
