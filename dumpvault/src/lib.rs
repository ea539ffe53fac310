//! Asynchronous database backup pipeline.
//!
//! Exports are dumped by an external tool, encrypted at rest and the
//! plaintext removed. Imports decrypt an artifact into a transient file,
//! feed it to the restore tool and remove it again. Both run on a
//! single-worker [`JobQueue`] so callers get an acknowledgement immediately
//! and the outcome later through an [`OutcomeSink`].

pub mod artifact;
pub mod command;
pub mod config;
pub mod crypto;
pub mod error;
pub mod job;
pub mod process;
pub mod queue;

pub use artifact::{ArtifactStore, BackupArtifact};
pub use config::Config;
pub use crypto::{CipherMode, CryptoKey, CryptoTransform};
pub use error::{Error, Result};
pub use job::{FailureKind, JobContext, JobKind, JobOutcome, JobRequest, JobTicket};
pub use queue::{ChannelSink, FanoutSink, JobQueue, OutcomeSink, RecentOutcomes, TracingSink};
