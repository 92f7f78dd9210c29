pub mod github;
pub mod middleware;
pub mod openapi;
pub mod routes;

#[cfg(test)]
mod testutil;

use axum::Router;
use github::DiffSource;
use lens_core::{TaskLifecycle, TaskQueue};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Collaborators shared by every handler. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: TaskLifecycle,
    pub queue: Arc<dyn TaskQueue>,
    pub diffs: Arc<dyn DiffSource>,
    /// Host accepted in `repo_url`, e.g. `github.com`.
    pub repo_host: String,
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

pub async fn serve<F>(
    state: AppState,
    addr: std::net::SocketAddr,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
