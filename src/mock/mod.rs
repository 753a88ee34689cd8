//! Reference mock supplier: implements the same contract the runner
//! enforces, deterministically, so the runner can be exercised end-to-end
//! without a real remote.

pub mod availability;
pub mod http;
pub mod repo;
pub mod routes;
pub mod token;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::mock::routes::Router;

/// Binds the mock supplier on `addr` and serves it on a background task.
/// Returns the bound address so callers can pass `127.0.0.1:0`.
pub async fn spawn(addr: &str, api_key: &str) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let router = Arc::new(Router::new(api_key));
    let handle = tokio::spawn(http::serve(listener, router));
    Ok((local_addr, handle))
}
