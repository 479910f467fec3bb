//! Lightweight admin HTTP server spawner
//!
//! Exposes `/healthz` and `/metrics` endpoints, with metrics provided by caller.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

async fn healthz() -> &'static str { "OK" }

/// Spawn an admin HTTP server exposing healthz and metrics endpoints on the
/// current runtime. The metrics text is rendered by the caller's function.
/// Returns the bound address, which differs from `addr` when port 0 is asked for.
pub async fn spawn_admin_server(addr: &str, metrics_fn: fn() -> String) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(move || async move { metrics_fn() }));
    info!(addr = %local, "admin server listening");
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "admin server stopped");
        }
    });
    Ok((local, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn fake_metrics() -> String { "retail_test_metric 1\n".to_string() }

    async fn fetch(addr: SocketAddr, path: &str) -> anyhow::Result<String> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    #[tokio::test]
    async fn serves_health_and_metrics() -> Result<(), anyhow::Error> {
        let (addr, task) = spawn_admin_server("127.0.0.1:0", fake_metrics).await?;

        let health = fetch(addr, "/healthz").await?;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("OK"));

        let metrics = fetch(addr, "/metrics").await?;
        assert!(metrics.contains("retail_test_metric 1"));

        task.abort();
        Ok(())
    }
}
