pub mod export;
pub mod import;
pub mod keygen;
pub mod list;

pub use export::run_export;
pub use import::run_import;
pub use keygen::run_keygen;
pub use list::run_list;

use anyhow::{bail, Context, Result};
use dumpvault::{ChannelSink, Config, FanoutSink, JobOutcome, JobQueue, JobTicket, TracingSink};
use std::future::Future;
use std::sync::Arc;

/// Start a queue, submit one job through `submit` and wait for its outcome.
pub(crate) async fn run_to_completion<F, Fut>(config: Config, submit: F) -> Result<JobOutcome>
where
    F: FnOnce(Arc<JobQueue>) -> Fut,
    Fut: Future<Output = dumpvault::Result<JobTicket>>,
{
    let (channel, mut outcomes) = ChannelSink::new();
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(channel));
    let queue = Arc::new(JobQueue::from_config(Arc::new(config), Arc::new(sink))?);

    let ticket = submit(queue.clone())
        .await
        .context("Failed to submit job")?;
    eprintln!("Job {} ({}) queued", ticket.id, ticket.kind);

    let outcome = outcomes
        .recv()
        .await
        .context("Job queue stopped before reporting an outcome")?;
    queue.shutdown().await;

    if outcome.id != ticket.id {
        bail!("Received outcome for unexpected job {}", outcome.id);
    }
    Ok(outcome)
}

/// Format the outcome for stdout: pretty JSON, or a short human summary.
pub(crate) fn render(outcome: &JobOutcome, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(outcome)?);
    }

    let mut lines = Vec::new();
    if outcome.success {
        lines.push(format!(
            "{} succeeded in {:.1}s",
            outcome.kind,
            outcome.duration().as_secs_f64()
        ));
        if let Some(ref path) = outcome.artifact_path {
            lines.push(format!("  artifact: {}", path.display()));
        }
    } else {
        lines.push(format!("{} failed", outcome.kind));
        if let Some(ref reason) = outcome.failure_reason {
            lines.push(format!("  reason: {}", reason));
        }
        if let Some(code) = outcome.exit_code {
            lines.push(format!("  exit code: {}", code));
        }
        for line in &outcome.stderr {
            lines.push(format!("  stderr: {}", line));
        }
    }
    Ok(lines.join("\n"))
}

/// Print the outcome; failures become an error so the process exits nonzero.
/// Only the rendered outcome goes to stdout.
pub(crate) fn report(outcome: &JobOutcome, json: bool) -> Result<()> {
    println!("{}", render(outcome, json)?);
    if let Some(ref cleanup) = outcome.cleanup_error {
        eprintln!("warning: cleanup failed: {}", cleanup);
    }

    if !outcome.success {
        bail!(
            "{} job failed: {}",
            outcome.kind,
            outcome.failure_reason.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumpvault::{FailureKind, JobRequest};
    use std::path::PathBuf;

    fn failed_import() -> JobOutcome {
        let request = JobRequest::import("clinic_20240101_000000.sql.enc");
        JobOutcome {
            id: request.id,
            kind: request.kind,
            success: false,
            artifact_path: None,
            exit_code: Some(1),
            failure: Some(FailureKind::NonZeroExit),
            failure_reason: Some("Process exited with code 1".to_string()),
            stderr: vec!["ERROR 1064 (42000): \"syntax\"".to_string()],
            cleanup_error: Some("could not remove temp file".to_string()),
            started_at: request.queued_at,
            finished_at: request.queued_at,
        }
    }

    #[test]
    fn test_json_render_is_a_single_json_document() {
        let outcome = failed_import();
        let rendered = render(&outcome, true).unwrap();

        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["id"], outcome.id.to_string());
        assert_eq!(value["kind"], "import");
        assert_eq!(value["failure"], "non_zero_exit");
        assert_eq!(value["exit_code"], 1);
    }

    #[test]
    fn test_text_render_lists_failure_details() {
        let mut outcome = failed_import();
        let rendered = render(&outcome, false).unwrap();
        assert!(rendered.starts_with("import failed"));
        assert!(rendered.contains("  exit code: 1"));
        assert!(rendered.contains("  stderr: ERROR 1064"));

        outcome.success = true;
        outcome.artifact_path = Some(PathBuf::from("/backups/clinic.sql.enc"));
        let rendered = render(&outcome, false).unwrap();
        assert!(rendered.starts_with("import succeeded in 0.0s"));
        assert!(rendered.ends_with("  artifact: /backups/clinic.sql.enc"));
    }

    #[test]
    fn test_report_fails_for_unsuccessful_outcome() {
        let err = report(&failed_import(), true).unwrap_err();
        assert!(err.to_string().contains("import job failed"));
    }
}
