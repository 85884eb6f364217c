use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshforge_api::app::build_app;
use meshforge_api::config::ServerConfig;
use meshforge_api::state::AppState;
use meshforge_pipeline::thumbnail::CommandRenderer;
use meshforge_pipeline::Pipeline;
use meshforge_store::MetadataStore;
use meshforge_upstream::api::GenerationApi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "meshforge_api=debug,meshforge_pipeline=debug,meshforge_upstream=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Storage ---
    let pipeline_config = config.pipeline_config();
    pipeline_config.layout.ensure_dirs().await?;
    let store = Arc::new(MetadataStore::open(&config.metadata_file).await?);
    store.health_check().await?;
    tracing::info!(
        root = %config.storage_root.display(),
        metadata = %config.metadata_file.display(),
        records = store.get_all().await.len(),
        "Metadata store opened",
    );

    // --- Pipeline ---
    let mut pipeline = Pipeline::new(Arc::clone(&store), pipeline_config);
    match config.thumbnail_command.as_deref().and_then(|line| {
        CommandRenderer::from_command_line(line, Duration::from_secs(config.thumbnail_timeout_secs))
    }) {
        Some(renderer) => {
            tracing::info!(program = %renderer.program(), "Icon rendering enabled");
            pipeline = pipeline.with_thumbnails(Arc::new(renderer));
        }
        None => tracing::info!("THUMBNAIL_COMMAND not set, icon rendering disabled"),
    }

    // --- Upstream ---
    let upstream = Arc::new(GenerationApi::new(config.upstream_url.clone()));
    tracing::info!(url = %upstream.url(), "Generation service configured");

    // --- App state ---
    let jobs = TaskTracker::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        pipeline: Arc::new(pipeline),
        upstream,
        jobs: jobs.clone(),
    };

    let app = build_app(state)?;

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!(running = jobs.len(), "Server stopped accepting connections, draining jobs");
    jobs.close();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, jobs.wait()).await.is_err() {
        tracing::warn!(
            running = jobs.len(),
            "Shutdown timeout reached with generation jobs still running",
        );
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
