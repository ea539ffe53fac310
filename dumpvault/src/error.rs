use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Backup file not found: {0}")]
    NotFound(String),

    #[error("Process exited with code {code}")]
    NonZeroExit { code: i32, stderr: Vec<String> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The ciphertext at `artifact` is valid, but the plaintext copy is still on disk.
    #[error("Artifact encrypted but cleanup failed: {reason}")]
    CleanupFailed { artifact: PathBuf, reason: String },

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, Error>;
