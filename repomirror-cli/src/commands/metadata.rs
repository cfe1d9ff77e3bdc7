//! `metadata` command: fetch repository metadata.

use console::style;
use repomirror::Mirror;

use crate::error::CliError;

/// Fetch and persist the repository metadata.
pub fn run(mirror: &Mirror) -> Result<(), CliError> {
    let summary = mirror.fetch_metadata()?;

    for (kind, location, bytes) in &summary.files {
        println!("  {:<16} {} ({} bytes)", kind, location, bytes);
    }
    if summary.is_clean() {
        println!("{} repodata saved", style("✓").green());
    } else {
        println!(
            "{} repodata saved with {} integrity warning(s)",
            style("!").yellow().bold(),
            summary.warnings.len()
        );
    }
    Ok(())
}
