//! Import job: read ciphertext → decrypt → transient plaintext → restore.
//!
//! The transient plaintext is removed on every path once validation has
//! passed, whatever happened in between.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};
use zeroize::Zeroizing;

use super::{JobContext, JobOutcome, JobRequest};
use crate::command::restore_command;
use crate::error::{Error, Result};
use crate::process::{self, ProcessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportStage {
    Validating,
    Decrypting,
    Restoring,
    CleaningUp,
}

fn enter(stage: ImportStage) {
    debug!(?stage, "Import stage");
}

#[instrument(skip_all, fields(job_id = %request.id, kind = "import"))]
pub(crate) async fn execute(
    ctx: &JobContext,
    request: &JobRequest,
    started_at: DateTime<Utc>,
) -> JobOutcome {
    let Some(file_name) = request.source_file_name.as_deref() else {
        let err = Error::InvalidRequest("import requires a source file name".to_string());
        return JobOutcome::failed(request, started_at, err);
    };

    let source = match validate(ctx, file_name).await {
        Ok(source) => source,
        Err(e) => {
            error!("Import rejected: {}", e);
            return JobOutcome::failed(request, started_at, e);
        }
    };

    let temp_path = ctx.config.temp_decrypted_path();
    let restored = decrypt_and_restore(ctx, &source, &temp_path).await;

    let cleanup_error = remove_transient(ctx).await;

    let mut outcome = match restored {
        Ok(result) => {
            info!("Database imported successfully from {}", file_name);
            JobOutcome::succeeded(request, started_at, source, result.exit_code, result.stderr_lines)
        }
        Err(e) => {
            warn!("Database import failed: {}", e);
            JobOutcome::failed(request, started_at, e)
        }
    };
    outcome.cleanup_error = cleanup_error;
    outcome
}

/// Delete the transient decrypted file if present. Returns the error text
/// when it could not be removed.
pub(crate) async fn remove_transient(ctx: &JobContext) -> Option<String> {
    enter(ImportStage::CleaningUp);
    let temp_path = ctx.config.temp_decrypted_path();
    match ctx.store.remove_if_exists(&temp_path).await {
        Ok(removed) => {
            debug!(removed, "Transient plaintext cleaned up");
            None
        }
        Err(e) => {
            error!(
                "Could not delete temp file {}: {}",
                temp_path.display(),
                e
            );
            Some(e.to_string())
        }
    }
}

/// Resolve the source artifact; no subprocess is started when this fails.
async fn validate(ctx: &JobContext, file_name: &str) -> Result<PathBuf> {
    enter(ImportStage::Validating);
    let source = ctx.store.resolve(file_name)?;
    ctx.store.ensure_dir().await?;

    if !ctx.store.is_file(&source).await {
        return Err(Error::NotFound(source.display().to_string()));
    }
    Ok(source)
}

async fn decrypt_and_restore(
    ctx: &JobContext,
    source: &Path,
    temp_path: &Path,
) -> Result<ProcessResult> {
    enter(ImportStage::Decrypting);
    let ciphertext = ctx.store.read(source).await?;
    let crypto = ctx.crypto.clone();
    let plaintext = tokio::task::spawn_blocking(move || crypto.decrypt(&ciphertext).map(Zeroizing::new))
        .await
        .map_err(|e| io::Error::other(format!("decryption task failed: {}", e)))??;

    ctx.store.write_private(temp_path, &plaintext).await?;
    debug!(
        "Decrypted {} into {} ({} bytes)",
        source.display(),
        temp_path.display(),
        plaintext.len()
    );
    drop(plaintext);

    enter(ImportStage::Restoring);
    let command = restore_command(&ctx.config.tools.restore, &ctx.config.database, ctx.password());
    info!("Executing command: {}", command);

    let input = tokio::fs::File::open(temp_path).await?;
    let mut discard = tokio::io::sink();
    let result = process::run(&command, Some(input), &mut discard).await?;

    if !result.success() {
        return Err(Error::NonZeroExit {
            code: result.exit_code,
            stderr: result.stderr_lines,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::{build_transform, CipherMode, CryptoKey};
    use crate::job::{FailureKind, JobRequest};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(temp: &TempDir, restore_script: &str) -> JobContext {
        let mut config = Config::default();
        config.backup.dir = temp.path().join("backups");
        config.tools.restore.program = "sh".to_string();
        config.tools.restore.extra_args = vec!["-c".to_string(), restore_script.to_string()];

        let crypto = build_transform(CipherMode::Gcm, &CryptoKey::generate()).unwrap();
        JobContext::new(Arc::new(config), crypto).unwrap()
    }

    async fn seed(ctx: &JobContext, name: &str, sql: &[u8]) {
        ctx.store.ensure_dir().await.unwrap();
        let ciphertext = ctx.crypto.encrypt(sql).unwrap();
        ctx.store
            .write(&ctx.store.path_for(name), &ciphertext)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_receives_plaintext_on_stdin() {
        let temp = TempDir::new().unwrap();
        let received = temp.path().join("received.sql");
        let ctx = context(&temp, &format!("cat > '{}'", received.display()));
        seed(&ctx, "db_20240101_000000.sql.enc", b"INSERT INTO t VALUES (1);").await;

        let request = JobRequest::import("db_20240101_000000.sql.enc");
        let outcome = execute(&ctx, &request, Utc::now()).await;

        assert!(outcome.success, "{:?}", outcome.failure_reason);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(std::fs::read(&received).unwrap(), b"INSERT INTO t VALUES (1);");
        assert!(!ctx.config.temp_decrypted_path().exists());
    }

    #[tokio::test]
    async fn test_missing_file_name_is_invalid() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, "exit 0");
        let mut request = JobRequest::import("x");
        request.source_file_name = None;

        let outcome = execute(&ctx, &request, Utc::now()).await;
        assert_eq!(outcome.failure, Some(FailureKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_directory_as_source_is_not_found() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, "exit 0");
        std::fs::create_dir_all(ctx.store.path_for("not_a_file.sql.enc")).unwrap();

        let outcome = execute(&ctx, &JobRequest::import("not_a_file.sql.enc"), Utc::now()).await;
        assert_eq!(outcome.failure, Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_stale_transient_file_is_replaced_and_removed() {
        let temp = TempDir::new().unwrap();
        let received = temp.path().join("received.sql");
        let ctx = context(&temp, &format!("cat > '{}'", received.display()));
        seed(&ctx, "db.sql.enc", b"fresh").await;
        std::fs::write(ctx.config.temp_decrypted_path(), b"stale leftovers from a crash").unwrap();

        let outcome = execute(&ctx, &JobRequest::import("db.sql.enc"), Utc::now()).await;

        assert!(outcome.success);
        assert_eq!(std::fs::read(&received).unwrap(), b"fresh");
        assert!(!ctx.config.temp_decrypted_path().exists());
    }
}
