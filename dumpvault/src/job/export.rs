//! Export job: dump → plaintext file → encrypt → delete plaintext.
//!
//! A failed dump (nonzero exit) leaves its plaintext file in place for
//! diagnosis. Every other failure after the dump has started removes the
//! plaintext, except when deleting it is exactly what failed.

use chrono::{DateTime, Local, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{JobContext, JobOutcome, JobRequest};
use crate::artifact::{timestamped_name, BackupArtifact};
use crate::command::dump_command;
use crate::error::{Error, Result};
use crate::process;

/// Attempts at finding a free second-resolution artifact name.
const NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportStage {
    Preparing,
    Dumping,
    Encrypting,
    Finalizing,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub artifact: BackupArtifact,
    pub exit_code: i32,
    pub stderr: Vec<String>,
}

#[instrument(skip_all, fields(job_id = %request.id, kind = "export"))]
pub(crate) async fn execute(
    ctx: &JobContext,
    request: &JobRequest,
    started_at: DateTime<Utc>,
) -> JobOutcome {
    match export(ctx).await {
        Ok(report) => {
            info!(
                "Database exported and encrypted successfully as {}",
                report.artifact.path.display()
            );
            JobOutcome::succeeded(
                request,
                started_at,
                report.artifact.path,
                report.exit_code,
                report.stderr,
            )
        }
        Err(e) => {
            warn!("Database export failed: {}", e);
            JobOutcome::failed(request, started_at, e)
        }
    }
}

fn enter(stage: ExportStage) {
    debug!(?stage, "Export stage");
}

/// Run the full export pipeline.
pub async fn export(ctx: &JobContext) -> Result<ExportReport> {
    enter(ExportStage::Preparing);
    ctx.store.ensure_dir().await?;
    let (plaintext_path, created_at) = reserve_name(ctx).await?;
    info!("Export file path: {}", plaintext_path.display());

    enter(ExportStage::Dumping);
    let command = dump_command(&ctx.config.tools.dump, &ctx.config.database, ctx.password());
    info!("Executing command: {}", command);

    let mut file = ctx.store.create(&plaintext_path).await?;
    let dumped = async {
        let result = process::run(&command, None::<tokio::io::Empty>, &mut file).await?;
        file.sync_all().await?;
        Ok::<_, Error>(result)
    }
    .await;
    drop(file);

    let result = match dumped {
        Ok(result) => result,
        Err(e) => {
            discard_plaintext(ctx, &plaintext_path).await;
            return Err(e);
        }
    };

    info!(
        exit_code = result.exit_code,
        bytes = result.stdout_bytes,
        "Dump process completed"
    );

    if !result.success() {
        warn!(
            "Dump failed, keeping {} for diagnosis",
            plaintext_path.display()
        );
        return Err(Error::NonZeroExit {
            code: result.exit_code,
            stderr: result.stderr_lines,
        });
    }

    enter(ExportStage::Encrypting);
    let ciphertext_path = ctx.store.encrypted_path(&plaintext_path);
    let size_bytes = match encrypt_artifact(ctx, &plaintext_path, &ciphertext_path).await {
        Ok(size) => size,
        Err(e) => {
            discard_plaintext(ctx, &plaintext_path).await;
            return Err(e);
        }
    };

    enter(ExportStage::Finalizing);
    if let Err(e) = ctx.store.delete(&plaintext_path).await {
        return Err(Error::CleanupFailed {
            artifact: ciphertext_path,
            reason: format!("could not delete {}: {}", plaintext_path.display(), e),
        });
    }

    Ok(ExportReport {
        artifact: BackupArtifact {
            path: ciphertext_path,
            encrypted: true,
            created_at: created_at.with_timezone(&Utc),
            size_bytes,
        },
        exit_code: result.exit_code,
        stderr: result.stderr_lines,
    })
}

/// Pick `<database>_<timestamp>.<ext>` such that neither it nor its
/// encrypted sibling exists yet.
///
/// Exports run one at a time, so a collision only happens when two finish
/// within the same second; waiting for the next second resolves it.
async fn reserve_name(ctx: &JobContext) -> Result<(PathBuf, DateTime<Local>)> {
    let backup = &ctx.config.backup;
    for _ in 0..NAME_ATTEMPTS {
        let now = Local::now();
        let name = timestamped_name(&ctx.config.database.name, &backup.plaintext_extension, now);
        let plaintext = ctx.store.path_for(&name);
        let ciphertext = ctx.store.encrypted_path(&plaintext);

        if !ctx.store.exists(&plaintext).await && !ctx.store.exists(&ciphertext).await {
            return Ok((plaintext, now));
        }

        let wait_ms = 1000 - u64::from(now.timestamp_subsec_millis().min(999)) + 5;
        debug!("Artifact name {} taken, waiting {}ms", name, wait_ms);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    }

    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free artifact name in the backup directory",
    )))
}

/// Read, encrypt and atomically write the ciphertext. Returns its size.
async fn encrypt_artifact(ctx: &JobContext, plaintext: &Path, ciphertext: &Path) -> Result<u64> {
    let data = zeroize::Zeroizing::new(ctx.store.read(plaintext).await?);
    let crypto = ctx.crypto.clone();
    let encrypted = tokio::task::spawn_blocking(move || crypto.encrypt(&data))
        .await
        .map_err(|e| io::Error::other(format!("encryption task failed: {}", e)))??;

    ctx.store.write_atomic(ciphertext, &encrypted).await?;
    debug!(
        "Encrypted {} -> {} ({} bytes)",
        plaintext.display(),
        ciphertext.display(),
        encrypted.len()
    );
    Ok(encrypted.len() as u64)
}

async fn discard_plaintext(ctx: &JobContext, path: &Path) {
    if let Err(e) = ctx.store.remove_if_exists(path).await {
        warn!("Could not remove plaintext {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::{build_transform, CipherMode, CryptoKey};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(temp: &TempDir, dump_script: &str) -> JobContext {
        let mut config = Config::default();
        config.backup.dir = temp.path().join("backups");
        config.tools.dump.program = "sh".to_string();
        config.tools.dump.extra_args = vec!["-c".to_string(), dump_script.to_string()];
        // `sh -c <script>` sees the connection flags as $0.. and ignores them
        config.database.password = Some("secret".to_string());

        let crypto = build_transform(CipherMode::Gcm, &CryptoKey::generate()).unwrap();
        JobContext::new(Arc::new(config), crypto).unwrap()
    }

    #[tokio::test]
    async fn test_export_removes_plaintext() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, "printf 'CREATE TABLE t (id INT);'");

        let report = export(&ctx).await.unwrap();
        let path = &report.artifact.path;

        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".sql.enc"));
        let plaintext = PathBuf::from(path.to_string_lossy().trim_end_matches(".enc"));
        assert!(!plaintext.exists());

        let decrypted = ctx.crypto.decrypt(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(decrypted, b"CREATE TABLE t (id INT);");
    }

    #[tokio::test]
    async fn test_sequential_exports_get_distinct_names() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, "printf 'x'");

        let first = export(&ctx).await.unwrap();
        let second = export(&ctx).await.unwrap();
        assert_ne!(first.artifact.path, second.artifact.path);
        assert_eq!(ctx.store.list().await.unwrap().len(), 2);
    }
}
