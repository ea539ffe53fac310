use axum::{
    routing::{get, post},
    Router,
};
use dumpvault::{ArtifactStore, JobQueue, RecentOutcomes};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub recent: Arc<RecentOutcomes>,
    pub store: ArtifactStore,
    pub metrics: Option<PrometheusHandle>,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(queue: Arc<JobQueue>, recent: Arc<RecentOutcomes>, store: ArtifactStore) -> Self {
        Self {
            state: AppState {
                queue,
                recent,
                store,
                metrics: None,
            },
        }
    }

    /// Expose `handle` at GET /metrics.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    pub fn router(&self) -> Router {
        let backup_routes = Router::new()
            .route("/exportDb", get(routes::export_db))
            .route("/importDb", post(routes::import_db))
            .route("/jobs", get(routes::list_jobs))
            .route("/jobs/:id", get(routes::get_job))
            .route("/files", get(routes::list_files));

        Router::new()
            .nest("/rest/v1/backup", backup_routes)
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves. In-flight requests are allowed to finish.
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
