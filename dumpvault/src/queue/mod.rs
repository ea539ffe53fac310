//! Single-worker job queue.
//!
//! Submissions go into a bounded channel and return as soon as the request
//! is enqueued. One worker task pulls requests in order and runs each job
//! end-to-end before taking the next, so exports and imports never overlap
//! and the backup directory needs no locking.
//!
//! A full channel makes submitters wait for a slot; requests are never
//! dropped. [`JobQueue::shutdown`] stops accepting work, lets the worker
//! finish everything already queued, and waits for it.

pub mod sink;

pub use sink::{ChannelSink, FanoutSink, OutcomeSink, RecentOutcomes, TracingSink};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::job::{self, import, JobContext, JobKind, JobOutcome, JobRequest, JobTicket};

pub struct JobQueue {
    sender: RwLock<Option<mpsc::Sender<JobRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl JobQueue {
    /// Build the job context from `config` and start the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: Arc<Config>, sink: Arc<dyn OutcomeSink>) -> anyhow::Result<Self> {
        let crypto = config.crypto.transform()?;
        info!(
            "Encryption: {} ({})",
            crypto.name(),
            if crypto.name() == "legacy" {
                "unauthenticated"
            } else {
                "authenticated"
            }
        );
        let ctx = JobContext::new(config, crypto)?;
        Ok(Self::start(ctx, sink))
    }

    /// Start the worker for `ctx`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(ctx: JobContext, sink: Arc<dyn OutcomeSink>) -> Self {
        let capacity = ctx.config.queue.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(run_worker(Arc::new(ctx), rx, sink, pending.clone()));
        info!(capacity, "Job queue started");

        Self {
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending,
        }
    }

    /// Enqueue a request. Waits only while the queue is full.
    pub async fn submit(&self, request: JobRequest) -> Result<JobTicket> {
        let sender = self.sender.read().clone().ok_or(Error::QueueClosed)?;
        let ticket = request.ticket();

        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(request).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::QueueClosed);
        }
        metrics::gauge!("dumpvault_queue_depth").set(self.pending() as f64);

        info!(job_id = %ticket.id, kind = %ticket.kind, "Job queued");
        Ok(ticket)
    }

    pub async fn submit_export(&self) -> Result<JobTicket> {
        self.submit(JobRequest::export()).await
    }

    pub async fn submit_import(&self, source_file_name: impl Into<String>) -> Result<JobTicket> {
        self.submit(JobRequest::import(source_file_name)).await
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Stop accepting jobs, drain the queue and wait for the worker.
    pub async fn shutdown(&self) {
        drop(self.sender.write().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            info!(pending = self.pending(), "Draining job queue");
            if let Err(e) = worker.await {
                error!("Job worker ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    ctx: Arc<JobContext>,
    mut rx: mpsc::Receiver<JobRequest>,
    sink: Arc<dyn OutcomeSink>,
    pending: Arc<AtomicUsize>,
) {
    info!("Job worker started");

    while let Some(request) = rx.recv().await {
        sink.on_started(&request);

        let outcome = run_isolated(ctx.clone(), request).await;

        let remaining = pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("dumpvault_queue_depth").set(remaining as f64);
        metrics::counter!(
            "dumpvault_jobs_total",
            "kind" => outcome.kind.as_str(),
            "result" => if outcome.success { "success" } else { "failure" }
        )
        .increment(1);
        metrics::histogram!("dumpvault_job_duration_seconds", "kind" => outcome.kind.as_str())
            .record(outcome.duration().as_secs_f64());

        sink.on_outcome(&outcome);
    }

    info!("Job worker stopped");
}

async fn run_isolated(ctx: Arc<JobContext>, request: JobRequest) -> JobOutcome {
    let job_ctx = ctx.clone();
    let job_request = request.clone();
    isolate(&ctx, request, async move { job::execute(&job_ctx, &job_request).await }).await
}

/// Run `job` on its own task so a panic becomes a failed outcome instead of
/// taking the worker down. A panicked import may have left its decrypted
/// transient file behind, so that is removed here.
async fn isolate<F>(ctx: &JobContext, request: JobRequest, job: F) -> JobOutcome
where
    F: Future<Output = JobOutcome> + Send + 'static,
{
    let started_at = Utc::now();
    match tokio::spawn(job).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(job_id = %request.id, "Job task failed: {}", e);
            let mut outcome =
                JobOutcome::failed(&request, started_at, Error::Panicked(e.to_string()));
            if request.kind == JobKind::Import {
                outcome.cleanup_error = import::remove_transient(ctx).await;
            }
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{build_transform, CipherMode, CryptoKey};
    use crate::job::FailureKind;
    use tempfile::TempDir;

    fn context(temp: &TempDir, capacity: usize) -> JobContext {
        let mut config = Config::default();
        config.backup.dir = temp.path().join("backups");
        config.queue.capacity = capacity;
        config.tools.dump.program = "sh".to_string();
        config.tools.dump.extra_args = vec!["-c".to_string(), "printf 'SELECT 1;'".to_string()];
        let crypto = build_transform(CipherMode::Gcm, &CryptoKey::generate()).unwrap();
        JobContext::new(Arc::new(config), crypto).unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_ticket_and_outcome_arrives() {
        let temp = TempDir::new().unwrap();
        let (sink, mut rx) = ChannelSink::new();
        let queue = JobQueue::start(context(&temp, 4), Arc::new(sink));

        let ticket = queue.submit_export().await.unwrap();
        assert_eq!(ticket.kind, JobKind::Export);

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.id, ticket.id);
        assert!(outcome.success, "{:?}", outcome.failure_reason);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_survives_failed_job() {
        let temp = TempDir::new().unwrap();
        let (sink, mut rx) = ChannelSink::new();
        let queue = JobQueue::start(context(&temp, 4), Arc::new(sink));

        queue.submit_import("missing.sql.enc").await.unwrap();
        queue.submit_export().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.failure, Some(FailureKind::NotFound));
        let second = rx.recv().await.unwrap();
        assert!(second.success);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects_new_work() {
        let temp = TempDir::new().unwrap();
        let (sink, mut rx) = ChannelSink::new();
        let queue = JobQueue::start(context(&temp, 1), Arc::new(sink));

        for _ in 0..3 {
            queue.submit_import("missing.sql.enc").await.unwrap();
        }
        queue.shutdown().await;

        assert!(queue.is_closed());
        assert_eq!(queue.pending(), 0);
        for _ in 0..3 {
            assert!(rx.try_recv().is_ok());
        }
        assert!(matches!(
            queue.submit_export().await,
            Err(Error::QueueClosed)
        ));
    }

    /// Writes `leave_behind` (if any), then panics mid-job.
    async fn panicking_job(leave_behind: Option<std::path::PathBuf>) -> JobOutcome {
        if let Some(path) = leave_behind {
            std::fs::write(path, b"DROP TABLE patient;").unwrap();
        }
        panic!("job blew up");
    }

    #[tokio::test]
    async fn test_panicked_import_removes_transient_file() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, 1);
        let transient = ctx.config.temp_decrypted_path();
        ctx.store.ensure_dir().await.unwrap();

        let path = transient.clone();
        let request = JobRequest::import("clinic_20240101_000000.sql.enc");
        let outcome = isolate(&ctx, request.clone(), panicking_job(Some(path))).await;

        assert_eq!(outcome.id, request.id);
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Internal));
        assert!(outcome.cleanup_error.is_none());
        assert!(!transient.exists());
    }

    #[tokio::test]
    async fn test_panicked_export_leaves_transient_path_alone() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, 1);
        let transient = ctx.config.temp_decrypted_path();
        ctx.store.ensure_dir().await.unwrap();
        std::fs::write(&transient, b"owned by someone else").unwrap();

        let outcome = isolate(&ctx, JobRequest::export(), panicking_job(None)).await;

        assert_eq!(outcome.failure, Some(FailureKind::Internal));
        assert!(transient.exists());
    }
}
