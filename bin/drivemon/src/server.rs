//! Metrics HTTP server
//!
//! Serves `/metrics` (or a configured path) and `/health` over TCP or a
//! unix socket. An absolute listen path selects the socket listener; an
//! optional `",<octal mode>"` suffix sets the socket file's access
//! mode after bind.

use anyhow::{Context, Result, bail};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use drivemon_exporter::{Collector, exposition};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tracing::info;

struct AppState {
    collector: Mutex<Collector>,
}

/// Serve until interrupted, then close every device handle.
pub async fn serve(listen: &str, metrics_path: &str, collector: Collector) -> Result<()> {
    if !metrics_path.starts_with('/') {
        bail!("metrics path must start with '/': {metrics_path}");
    }

    let state = Arc::new(AppState {
        collector: Mutex::new(collector),
    });
    let app = Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state));

    if listen.starts_with('/') {
        let (path, mode) = parse_socket_listen(listen)?;
        // A stale socket file from an unclean shutdown blocks the bind.
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind unix socket {path}"))?;
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set mode {mode:o} on {path}"))?;
        }
        info!("Serving metrics on unix socket {path}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind {listen}"))?;
        info!("Serving metrics on http://{listen}{metrics_path}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    state.collector.lock().close();
    info!("Shut down cleanly");
    Ok(())
}

/// Split a `"<absolute path>[,<octal mode>]"` listen string.
fn parse_socket_listen(listen: &str) -> Result<(String, Option<u32>)> {
    match listen.split_once(',') {
        None => Ok((listen.to_string(), None)),
        Some((path, mode)) => {
            let mode = u32::from_str_radix(mode, 8)
                .with_context(|| format!("failed to parse socket mode {mode}"))?;
            Ok((path.to_string(), Some(mode)))
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Scrapes serialize on the collector lock, so a device handle never
    // sees two in-flight reads.
    let body = {
        let mut collector = state.collector.lock();
        exposition::render(&collector.collect())
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        body,
    )
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.collector.lock().device_count() > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NO DEVICES")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socket_listen_plain() {
        let (path, mode) = parse_socket_listen("/run/drivemon.sock").unwrap();
        assert_eq!(path, "/run/drivemon.sock");
        assert_eq!(mode, None);
    }

    #[test]
    fn test_parse_socket_listen_with_mode() {
        let (path, mode) = parse_socket_listen("/run/drivemon.sock,0666").unwrap();
        assert_eq!(path, "/run/drivemon.sock");
        assert_eq!(mode, Some(0o666));
    }

    #[test]
    fn test_parse_socket_listen_bad_mode() {
        assert!(parse_socket_listen("/run/drivemon.sock,batman").is_err());
    }
}
