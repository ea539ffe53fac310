//! Backup directory and artifact files.
//!
//! All artifacts live flat inside a single backup directory:
//! `<database>_<YYYYMMDD_HHmmss>.sql.enc` for finished backups, plus the
//! transient plaintext files created by running jobs.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Timestamp layout embedded in artifact names (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A file in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupArtifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Format `<prefix>_<YYYYMMDD_HHmmss>.<extension>`.
pub fn timestamped_name(prefix: &str, extension: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.{}", prefix, at.format(TIMESTAMP_FORMAT), extension)
}

/// Local filesystem store rooted at the backup directory.
///
/// Performs no locking; the job queue serializes every access.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    encrypted_suffix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, encrypted_suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            encrypted_suffix: encrypted_suffix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the backup directory and its parents. Idempotent.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn ensure_dir(&self) -> Result<()> {
        if fs::try_exists(&self.dir).await? {
            debug!("Backup directory already exists");
        } else {
            fs::create_dir_all(&self.dir).await?;
            tracing::info!("Backup directory created: {}", self.dir.display());
        }
        Ok(())
    }

    /// Path of a file inside the backup directory.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Validate a caller-supplied file name and return its path.
    ///
    /// Only bare file names are accepted; anything that could escape the
    /// backup directory is rejected.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let name = file_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("file name is empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(Error::InvalidRequest(format!(
                "'{}' is not a plain file name",
                file_name
            )));
        }
        Ok(self.path_for(name))
    }

    /// Sibling path carrying the encrypted suffix (`dump.sql` -> `dump.sql.enc`).
    pub fn encrypted_path(&self, plaintext: &Path) -> PathBuf {
        let mut name = plaintext.as_os_str().to_owned();
        name.push(".");
        name.push(&self.encrypted_suffix);
        PathBuf::from(name)
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Create a new, empty, owner-only file. Fails if the path already exists.
    pub async fn create(&self, path: &Path) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        Ok(options.open(path).await?)
    }

    #[instrument(skip(self, data), fields(path = %path.display(), size = data.len()))]
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        debug!("Writing {} bytes", data.len());
        fs::write(path, data).await?;
        Ok(())
    }

    /// Write an owner-only file, replacing any previous content.
    #[instrument(skip(self, data), fields(path = %path.display(), size = data.len()))]
    pub async fn write_private(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Write through a temporary sibling and rename into place, so `path`
    /// never holds a partial file.
    #[instrument(skip(self, data), fields(path = %path.display(), size = data.len()))]
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let result = async {
            let mut file = File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a file; a missing file is an error.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn delete(&self, path: &Path) -> Result<()> {
        debug!("Deleting {:?}", path);
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Delete a file if present. Returns whether anything was removed.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn remove_if_exists(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Encrypted artifacts in the backup directory, newest first.
    pub async fn list(&self) -> Result<Vec<BackupArtifact>> {
        let suffix = format!(".{}", self.encrypted_suffix);
        let mut artifacts = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            let encrypted = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix));
            if !encrypted {
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            artifacts.push(BackupArtifact {
                path,
                encrypted,
                created_at,
                size_bytes: metadata.len(),
            });
        }

        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.path.cmp(&a.path)));
        Ok(artifacts)
    }
}
