//! Export command implementation.

use anyhow::Result;
use dumpvault::Config;

use super::{report, run_to_completion};

/// Dump, encrypt and store the configured database.
pub async fn run_export(config: Config, json: bool) -> Result<()> {
    eprintln!(
        "Exporting database '{}' into {}",
        config.database.name,
        config.backup.dir.display()
    );

    let outcome = run_to_completion(config, |queue| async move { queue.submit_export().await }).await?;
    report(&outcome, json)
}
