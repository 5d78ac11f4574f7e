// Common test utilities and helpers
#![allow(dead_code)]

use m8s::models::Pod;
use m8s::Storage;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const NODE: &str = "node-01";

pub fn state_path(dir: &TempDir) -> PathBuf {
    dir.path().join("state.json")
}

/// A fresh store backed by a file in its own temporary directory. Keep the
/// directory alive for as long as the store is used.
pub async fn temp_storage() -> (TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(state_path(&dir)).await.unwrap();
    (dir, storage)
}

pub fn pod_on_node(name: &str, image: &str) -> Pod {
    Pod::new(name, "default", image).on_node(NODE)
}

/// Serves the API for `storage` on an ephemeral port. The server stops when the
/// returned sender is dropped.
pub async fn spawn_server(storage: Storage) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        m8s::api::serve(listener, storage, async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    (format!("http://{}", addr), tx)
}
