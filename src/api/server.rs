use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
}

pub fn router(storage: Storage) -> Router {
    let state = AppState { storage };

    Router::new()
        .route("/livez", get(liveness))
        .route("/readyz", get(readiness))
        .route("/healthz", get(health))
        .nest("/api/v1", super::routes::v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server<F>(storage: Storage, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve(listener, storage, shutdown).await
}

/// Serves the API on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, storage: Storage, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("m8s API server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(storage))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("m8s API server stopped");
    Ok(())
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

async fn readiness(State(state): State<AppState>) -> StatusCode {
    match tokio::fs::metadata(state.storage.path()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
