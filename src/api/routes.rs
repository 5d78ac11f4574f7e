use axum::{
    routing::{get, put},
    Router,
};

use super::handlers;
use super::server::AppState;

pub fn v1_routes() -> Router<AppState> {
    Router::new()
        // Pod routes
        .route(
            "/pods",
            get(handlers::list_all_pods).post(handlers::create_pod),
        )
        .route(
            "/namespaces/:namespace/pods",
            get(handlers::list_pods).post(handlers::create_namespaced_pod),
        )
        .route(
            "/namespaces/:namespace/pods/:name",
            get(handlers::get_pod)
                .put(handlers::update_pod)
                .delete(handlers::delete_pod),
        )
        .route(
            "/namespaces/:namespace/pods/:name/status",
            put(handlers::update_pod_status),
        )
        // Node routes
        .route(
            "/nodes",
            get(handlers::list_nodes).post(handlers::create_node),
        )
        .route(
            "/nodes/:name",
            get(handlers::get_node)
                .put(handlers::update_node)
                .delete(handlers::delete_node),
        )
}
