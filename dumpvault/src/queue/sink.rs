//! Destinations for job lifecycle events.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::job::{JobOutcome, JobRequest};

/// Receives one `on_outcome` call per finished job, after its terminal state.
///
/// Called from the worker task; implementations must not block for long.
pub trait OutcomeSink: Send + Sync {
    /// A job left the queue and is about to run.
    fn on_started(&self, _request: &JobRequest) {}

    fn on_outcome(&self, outcome: &JobOutcome);
}

impl<T: OutcomeSink + ?Sized> OutcomeSink for Arc<T> {
    fn on_started(&self, request: &JobRequest) {
        (**self).on_started(request)
    }

    fn on_outcome(&self, outcome: &JobOutcome) {
        (**self).on_outcome(outcome)
    }
}

/// Emits a structured log event per outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn on_started(&self, request: &JobRequest) {
        tracing::info!(
            target: "dumpvault::jobs",
            job_id = %request.id,
            kind = %request.kind,
            source = ?request.source_file_name,
            "job started"
        );
    }

    fn on_outcome(&self, outcome: &JobOutcome) {
        let artifact = outcome.artifact_path.as_ref().map(|p| p.display().to_string());
        if outcome.success {
            tracing::info!(
                target: "dumpvault::jobs",
                job_id = %outcome.id,
                kind = %outcome.kind,
                artifact = ?artifact,
                duration_ms = outcome.duration().as_millis() as u64,
                "job succeeded"
            );
        } else {
            tracing::error!(
                target: "dumpvault::jobs",
                job_id = %outcome.id,
                kind = %outcome.kind,
                failure = ?outcome.failure,
                exit_code = ?outcome.exit_code,
                reason = ?outcome.failure_reason,
                artifact = ?artifact,
                "job failed"
            );
        }
        if let Some(ref cleanup) = outcome.cleanup_error {
            tracing::warn!(target: "dumpvault::jobs", job_id = %outcome.id, "cleanup failed: {}", cleanup);
        }
    }
}

/// Forwards outcomes into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<JobOutcome>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelSink {
    fn on_outcome(&self, outcome: &JobOutcome) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(outcome.clone());
    }
}

/// Bounded in-memory history of the current run, newest first.
#[derive(Debug)]
pub struct RecentOutcomes {
    capacity: usize,
    outcomes: RwLock<VecDeque<JobOutcome>>,
}

impl RecentOutcomes {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outcomes: RwLock::new(VecDeque::new()),
        }
    }

    pub fn list(&self) -> Vec<JobOutcome> {
        self.outcomes.read().iter().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<JobOutcome> {
        self.outcomes.read().iter().find(|o| o.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.outcomes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.read().is_empty()
    }
}

impl OutcomeSink for RecentOutcomes {
    fn on_outcome(&self, outcome: &JobOutcome) {
        let mut outcomes = self.outcomes.write();
        if outcomes.len() == self.capacity {
            outcomes.pop_back();
        }
        outcomes.push_front(outcome.clone());
    }
}

/// Delivers every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl OutcomeSink for FanoutSink {
    fn on_started(&self, request: &JobRequest) {
        for sink in &self.sinks {
            sink.on_started(request);
        }
    }

    fn on_outcome(&self, outcome: &JobOutcome) {
        for sink in &self.sinks {
            sink.on_outcome(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::Utc;

    fn outcome() -> JobOutcome {
        JobOutcome::failed(
            &JobRequest::export(),
            Utc::now(),
            Error::NotFound("x".to_string()),
        )
    }

    #[test]
    fn test_recent_outcomes_is_bounded_and_newest_first() {
        let recent = RecentOutcomes::new(2);
        let (a, b, c) = (outcome(), outcome(), outcome());
        recent.on_outcome(&a);
        recent.on_outcome(&b);
        recent.on_outcome(&c);

        let listed = recent.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, c.id);
        assert_eq!(listed[1].id, b.id);
        assert!(recent.get(a.id).is_none());
        assert!(recent.get(b.id).is_some());
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let recent = Arc::new(RecentOutcomes::new(10));
        let (channel, mut rx) = ChannelSink::new();
        let fanout = FanoutSink::new()
            .with(recent.clone())
            .with(Arc::new(channel))
            .with(Arc::new(TracingSink));

        let o = outcome();
        fanout.on_outcome(&o);

        assert_eq!(recent.len(), 1);
        assert_eq!(rx.recv().await.unwrap().id, o.id);
    }
}
