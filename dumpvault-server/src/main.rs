use anyhow::{Context, Result};
use clap::Parser;
use dumpvault::{Config, FanoutSink, JobQueue, OutcomeSink, RecentOutcomes, TracingSink};
use dumpvault_server::telemetry;
use dumpvault_server::ApiServer;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dumpvault-server")]
#[command(about = "Encrypted database backup job server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "DUMPVAULT_CONFIG", default_value = "dumpvault.toml")]
    config: PathBuf,

    /// Address to bind to, overrides server.bind_addr
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, source) = Config::load_or_default(&args.config)?;
    telemetry::init_tracing(&config.observability);
    let metrics = telemetry::init_metrics(&config.observability)?;

    tracing::info!("Using {}", source);
    tracing::info!("Backup directory: {}", config.backup.dir.display());

    let addr = args.bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let config = Arc::new(config);

    let recent = Arc::new(RecentOutcomes::new(config.server.recent_outcomes));
    let sink: Arc<dyn OutcomeSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(recent.clone()),
    );
    let queue = Arc::new(
        JobQueue::from_config(config.clone(), sink).context("Failed to start job queue")?,
    );

    let mut server = ApiServer::new(queue.clone(), recent, config.artifact_store());
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }

    tracing::info!("Starting dumpvault server on {}", addr);
    let served = server.serve(&addr, shutdown_signal()).await;

    tracing::info!("Waiting for queued jobs to finish...");
    queue.shutdown().await;
    tracing::info!("Server shutdown complete");

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
}
