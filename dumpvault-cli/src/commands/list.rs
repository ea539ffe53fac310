//! List command implementation.

use anyhow::Result;
use dumpvault::Config;

/// Show the encrypted artifacts in the backup directory, newest first.
pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let artifacts = config.artifact_store().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No backups in {}", config.backup.dir.display());
        return Ok(());
    }

    println!("{:<40} {:>12}  {}", "FILE", "SIZE", "MODIFIED");
    for artifact in &artifacts {
        println!(
            "{:<40} {:>12}  {}",
            artifact.file_name().unwrap_or("?"),
            format_size(artifact.size_bytes),
            artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();
    println!("{} backup(s)", artifacts.len());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MiB");
    }
}
