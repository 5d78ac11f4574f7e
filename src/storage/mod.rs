pub mod node_store;
pub mod pod_store;

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Node, Pod};

use self::node_store::NodeStore;
use self::pod_store::PodStore;

/// The persisted document: two ordered collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

pub(crate) struct Inner {
    path: PathBuf,
    state: RwLock<State>,
}

impl Inner {
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().await
    }

    /// Runs `f` against a copy of the state under the write lock, persists the
    /// copy, and only then makes it visible.
    pub(crate) async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut State) -> Result<T, StoreError>,
    {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        persist(&self.path, &next).await?;
        *guard = next;
        Ok(out)
    }
}

/// Handle to the state store. Cheap to clone; all clones share one lock and one file.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

impl Storage {
    /// Loads the state file at `path`, creating an empty one if it does not exist.
    ///
    /// A file that exists but cannot be parsed is an error: the store never
    /// resets itself over existing data.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let state = match tokio::fs::read(&path).await {
            Ok(data) => {
                let state: State =
                    serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                info!(
                    "Loaded state from {} ({} pods, {} nodes)",
                    path.display(),
                    state.pods.len(),
                    state.nodes.len()
                );
                state
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let state = State::default();
                persist(&path, &state).await?;
                info!("Created empty state file {}", path.display());
                state
            }
            Err(e) => return Err(StoreError::Io { path, source: e }),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                state: RwLock::new(state),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn pods(&self) -> PodStore {
        PodStore::new(self.inner.clone())
    }

    pub fn nodes(&self) -> NodeStore {
        NodeStore::new(self.inner.clone())
    }

    /// A copy of the whole document.
    pub async fn snapshot(&self) -> State {
        self.inner.read().await.clone()
    }
}

async fn persist(path: &Path, state: &State) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(state)?;
    let tmp = temp_path(path);
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
    file.write_all(&data).await.map_err(io_err)?;
    file.write_all(b"\n").await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    debug!("Persisted state to {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
