//! progress-drive server binary.
//!
//! Serves the study site's static files (index page, assets, data and public
//! documents) and a small JSON progress store with import and export. The
//! main entry point resolves the project layout, builds the Axum router and
//! runs a single HTTP listener until shutdown.

mod api;
mod atomic;
mod config;
mod error;
mod etag;
mod files;
mod http;
mod logging;
mod progress;
mod router;
mod storage;

use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::config::{Args, ProjectPaths, SHUTDOWN_GRACE_SECS};

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let paths = ProjectPaths::resolve(args.root.as_deref())?;
    paths.ensure_data_dir().await?;

    let app = router::build_router(&paths, &args.cors_origins, args.max_upload_size);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    println!("Project Root: {}", paths.project.display());
    println!("Serving on http://{addr}");
    info!(
        root = %paths.project.display(),
        progress = %paths.progress_file().display(),
        "starting HTTP server at {}",
        addr
    );

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::spawn(shutdown_signal(handle));
    server.await
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
