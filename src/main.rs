use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workflow_dispatch::config::Config;
use workflow_dispatch::dispatch::DispatchClient;
use workflow_dispatch::engine::LocalEngine;
use workflow_dispatch::{routes, worker, workflows, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing();

    let registry = Arc::new(
        workflows::default_registry(&config.workflow_settings())
            .context("failed to register workflows")?,
    );
    info!(workflows = ?registry.workflow_names(), task_queue = %config.task_queue, "registry ready");

    let engine = Arc::new(LocalEngine::new(registry.clone(), config.task_queue.clone()));
    let dispatch = DispatchClient::new(registry, engine.clone(), config.task_queue.clone())
        .with_query_errors(config.query_errors);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = worker::start_background_workers(engine, shutdown_rx)
        .context("failed to start worker")?;

    let app = routes::router(AppState::new(dispatch)).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_addr))?;
    info!(addr = %config.api_addr, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server failed")?;

    // Requests accepted during the drain still need a worker.
    let _ = shutdown_tx.send(true);
    worker.await.context("worker task panicked")?;
    info!("shut down cleanly");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(?err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
