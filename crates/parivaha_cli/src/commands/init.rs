//! Init command implementation.

use super::CliResult;
use crate::config;
use std::path::Path;

/// Writes the configuration templates into `dir`.
pub fn run(dir: &Path, overwrite: bool) -> CliResult {
    let written = config::bootstrap(dir, overwrite)?;
    if written.is_empty() {
        println!("Configuration already present at {}", dir.display());
        println!("Use --overwrite to restore the templates.");
        return Ok(());
    }
    for path in &written {
        println!("Wrote {}", path.display());
    }
    println!("Edit {} and set your Notion token in {}", config::SYNC_FILE, config::ENV_FILE);
    Ok(())
}
