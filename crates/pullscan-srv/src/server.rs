//! HTTP server runner: binds the listener and serves until shutdown.

use std::future::Future;
use std::sync::Arc;

use pullscan_core::{Analyzer, ProcessRunner};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::handler;

/// Start the service with the given configuration.
///
/// Binds the listen address, then serves requests with the real scanner
/// until SIGINT or SIGTERM.
pub async fn run(config: &ServerConfig) -> crate::Result<()> {
    config.validate()?;

    let analyzer = Arc::new(Analyzer::new(config.analyzer_config()));

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|source| crate::SrvError::Bind {
            addr: config.listen,
            source,
        })?;

    info!(
        addr = %config.listen,
        tmp_dir = %config.tmp_dir.display(),
        scanner = %config.scanner.program,
        "pullscan listening"
    );

    serve(listener, analyzer, config.max_body_bytes, shutdown_signal()).await
}

/// Serve requests on an already-bound listener until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after shutdown begins.
pub async fn serve<R, F>(
    listener: TcpListener,
    analyzer: Arc<Analyzer<R>>,
    max_body_bytes: usize,
    shutdown: F,
) -> crate::Result<()>
where
    R: ProcessRunner + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let app = handler::router(analyzer, max_body_bytes);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::SrvError::Server(e.to_string()))?;

    info!("pullscan stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
