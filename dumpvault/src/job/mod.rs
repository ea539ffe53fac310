//! Export and import jobs.
//!
//! A job runs to exactly one terminal [`JobOutcome`]. Errors never escape a
//! job: they are folded into the outcome so the worker can move on.

pub mod export;
pub mod import;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::crypto::CryptoTransform;
use crate::error::Error;

/// Which pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Export,
    Import,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Export => "export",
            JobKind::Import => "import",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted unit of work. Consumed exactly once by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub kind: JobKind,
    /// Encrypted artifact to restore (imports only)
    pub source_file_name: Option<String>,
    pub queued_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn export() -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Export,
            source_file_name: None,
            queued_at: Utc::now(),
        }
    }

    pub fn import(source_file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Import,
            source_file_name: Some(source_file_name.into()),
            queued_at: Utc::now(),
        }
    }

    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            id: self.id,
            kind: self.kind,
            queued_at: self.queued_at,
        }
    }
}

/// Acknowledgement handed back on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: Uuid,
    pub kind: JobKind,
    pub queued_at: DateTime<Utc>,
}

/// Machine-readable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Spawn,
    Io,
    Crypto,
    NotFound,
    NonZeroExit,
    CleanupFailed,
    InvalidRequest,
    Internal,
}

impl From<&Error> for FailureKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::Spawn { .. } => FailureKind::Spawn,
            Error::Io(_) => FailureKind::Io,
            Error::Crypto(_) => FailureKind::Crypto,
            Error::NotFound(_) => FailureKind::NotFound,
            Error::NonZeroExit { .. } => FailureKind::NonZeroExit,
            Error::CleanupFailed { .. } => FailureKind::CleanupFailed,
            Error::InvalidRequest(_) => FailureKind::InvalidRequest,
            Error::QueueClosed | Error::Panicked(_) => FailureKind::Internal,
        }
    }
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub id: Uuid,
    pub kind: JobKind,
    pub success: bool,
    /// Ciphertext written by an export, or the artifact restored by an import
    pub artifact_path: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub failure_reason: Option<String>,
    /// Trailing stderr lines of the subprocess
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr: Vec<String>,
    /// Transient file cleanup problem that did not change the verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub(crate) fn succeeded(
        request: &JobRequest,
        started_at: DateTime<Utc>,
        artifact_path: PathBuf,
        exit_code: i32,
        stderr: Vec<String>,
    ) -> Self {
        Self {
            id: request.id,
            kind: request.kind,
            success: true,
            artifact_path: Some(artifact_path),
            exit_code: Some(exit_code),
            failure: None,
            failure_reason: None,
            stderr,
            cleanup_error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub(crate) fn failed(request: &JobRequest, started_at: DateTime<Utc>, err: Error) -> Self {
        let failure = FailureKind::from(&err);
        let failure_reason = err.to_string();
        let (exit_code, stderr, artifact_path) = match err {
            Error::NonZeroExit { code, stderr } => (Some(code), stderr, None),
            Error::CleanupFailed { artifact, .. } => (Some(0), Vec::new(), Some(artifact)),
            _ => (None, Vec::new(), None),
        };

        Self {
            id: request.id,
            kind: request.kind,
            success: false,
            artifact_path,
            exit_code,
            failure: Some(failure),
            failure_reason: Some(failure_reason),
            stderr,
            cleanup_error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Everything a job needs, built once and shared by every job.
pub struct JobContext {
    pub config: Arc<Config>,
    pub crypto: Arc<dyn CryptoTransform>,
    pub store: ArtifactStore,
    password: String,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("backup_dir", &self.store.dir())
            .field("crypto", &self.crypto.name())
            .finish()
    }
}

impl JobContext {
    pub fn new(config: Arc<Config>, crypto: Arc<dyn CryptoTransform>) -> anyhow::Result<Self> {
        let password = config.database.resolve_password()?;
        let store = config.artifact_store();
        Ok(Self {
            config,
            crypto,
            store,
            password,
        })
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

/// Run one job to its terminal outcome.
pub async fn execute(ctx: &JobContext, request: &JobRequest) -> JobOutcome {
    let started_at = Utc::now();
    match request.kind {
        JobKind::Export => export::execute(ctx, request, started_at).await,
        JobKind::Import => import::execute(ctx, request, started_at).await,
    }
}
