use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hasharchive_client::HttpFetcher;
use hasharchive_core::{
    ArchiveConfig, ArchiveService, DuplicatePolicy, TracingWorkerReporter, WorkerConfig,
    WorkerService,
};
use hasharchive_db::{ArchiveDb, DatabaseConfig};
use hasharchive_server::routes;
use hasharchive_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hasharchive=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("HASHARCHIVE_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let admin_token = std::env::var("HASHARCHIVE_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    let policy: DuplicatePolicy = match std::env::var("HASHARCHIVE_DUPLICATE_POLICY") {
        Ok(value) => value.parse().map_err(anyhow::Error::msg)?,
        Err(_) => DuplicatePolicy::default(),
    };

    if admin_token.is_none() {
        tracing::warn!("HASHARCHIVE_ADMIN_TOKEN not set, queue endpoints are disabled");
    }

    let db = ArchiveDb::open(&DatabaseConfig::from_env()?)?;
    let archive = ArchiveService::open(db, ArchiveConfig::default().with_duplicate_policy(policy))
        .await
        .context("Failed to open archive")?;

    let cancel = CancellationToken::new();
    let worker = WorkerService::new(
        archive.queue().clone(),
        HttpFetcher::new()?,
        WorkerConfig::default(),
    );
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(worker_cancel.clone(), &TracingWorkerReporter).await {
            tracing::error!(error = %e, "Worker stopped on fatal error");
            worker_cancel.cancel();
        }
    });

    let state = Arc::new(AppState {
        archive,
        admin_token,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(%policy, "Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    worker_handle.await?;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        }
        // A fatal worker error also brings the server down.
        () = cancel.cancelled() => {}
    }
    cancel.cancel();
}
