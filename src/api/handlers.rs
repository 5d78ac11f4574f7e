use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;

use super::error::ApiError;
use super::server::AppState;
use crate::models::{Node, NodeList, Pod, PodList, StatusUpdate, DEFAULT_NAMESPACE};

type ApiResult<T> = Result<T, ApiError>;

// Pod handlers
pub async fn list_all_pods(State(state): State<AppState>) -> Json<PodList> {
    Json(PodList {
        items: state.storage.pods().list().await,
    })
}

pub async fn list_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<PodList> {
    Json(PodList {
        items: state.storage.pods().list_namespace(&namespace).await,
    })
}

/// Creates a pod in the namespace named by the body, or `default`.
pub async fn create_pod(
    State(state): State<AppState>,
    Json(pod): Json<Pod>,
) -> ApiResult<(StatusCode, Json<Pod>)> {
    let namespace = match pod.namespace.as_str() {
        "" => DEFAULT_NAMESPACE.to_string(),
        ns => ns.to_string(),
    };
    create(state, namespace, pod).await
}

pub async fn create_namespaced_pod(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(pod): Json<Pod>,
) -> ApiResult<(StatusCode, Json<Pod>)> {
    create(state, namespace, pod).await
}

async fn create(
    state: AppState,
    namespace: String,
    mut pod: Pod,
) -> ApiResult<(StatusCode, Json<Pod>)> {
    pod.namespace = path_value("namespace", &namespace, &pod.namespace)?;
    pod.created_at = Utc::now();

    let created = state.storage.pods().create(pod).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_pod(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Pod>> {
    Ok(Json(state.storage.pods().get(&namespace, &name).await?))
}

pub async fn update_pod(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut pod): Json<Pod>,
) -> ApiResult<Json<Pod>> {
    pod.namespace = path_value("namespace", &namespace, &pod.namespace)?;
    pod.name = path_value("name", &name, &pod.name)?;

    Ok(Json(state.storage.pods().update(pod).await?))
}

pub async fn update_pod_status(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Pod>> {
    let pod = state
        .storage
        .pods()
        .update_status(&namespace, &name, update.status)
        .await?;
    Ok(Json(pod))
}

pub async fn delete_pod(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Pod>> {
    Ok(Json(state.storage.pods().delete(&namespace, &name).await?))
}

// Node handlers
pub async fn list_nodes(State(state): State<AppState>) -> Json<NodeList> {
    Json(NodeList {
        items: state.storage.nodes().list().await,
    })
}

pub async fn create_node(
    State(state): State<AppState>,
    Json(mut node): Json<Node>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    node.created_at = Utc::now();
    let created = state.storage.nodes().create(node).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Node>> {
    Ok(Json(state.storage.nodes().get(&name).await?))
}

pub async fn update_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut node): Json<Node>,
) -> ApiResult<Json<Node>> {
    node.name = path_value("name", &name, &node.name)?;
    Ok(Json(state.storage.nodes().update(node).await?))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Node>> {
    Ok(Json(state.storage.nodes().delete(&name).await?))
}

/// The path wins; a body that names something else is rejected.
fn path_value(field: &str, from_path: &str, from_body: &str) -> ApiResult<String> {
    if !from_body.is_empty() && from_body != from_path {
        return Err(ApiError::BadRequest(format!(
            "{} in body ({}) does not match {} in path ({})",
            field, from_body, field, from_path
        )));
    }
    Ok(from_path.to_string())
}
