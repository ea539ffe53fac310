//! Import command implementation.

use anyhow::{Context, Result};
use dumpvault::Config;
use std::path::Path;

use super::{report, run_to_completion};

/// Decrypt an artifact from the backup directory and restore it.
///
/// `file` may be a bare artifact name or a path; only the file name is used
/// and it must live in the backup directory.
pub async fn run_import(config: Config, file: &Path, json: bool) -> Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid artifact name: {}", file.display()))?;

    eprintln!(
        "Restoring '{}' into database '{}'",
        file_name, config.database.name
    );

    let outcome = run_to_completion(config, move |queue| async move {
        queue.submit_import(file_name).await
    })
    .await?;
    report(&outcome, json)
}
