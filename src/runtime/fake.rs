//! In-memory container engine.
//!
//! Behaves like a real engine at the level the kubelet observes it: containers
//! are created, resumed, stopped and removed by handle. Every state-changing
//! engine operation is recorded so callers can assert on exactly what was done,
//! and failures can be injected per handle.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::handle::{container_name, HANDLE_PREFIX};
use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::models::{Pod, PodStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeState {
    Running,
    Exited(i64),
}

/// A state-changing operation issued against the fake engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create(String),
    Resume(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    state: FakeState,
}

#[derive(Default)]
struct FakeEngine {
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<EngineCall>,
    fail_start: HashSet<String>,
    fail_remove: HashSet<String>,
    fail_probe: HashSet<String>,
    fail_list: bool,
}

#[derive(Clone, Default)]
pub struct FakeRuntime {
    engine: Arc<Mutex<FakeEngine>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a running container that the engine did not start itself.
    pub async fn insert_running(&self, handle: impl Into<String>, image: impl Into<String>) {
        self.engine.lock().await.containers.insert(
            handle.into(),
            FakeContainer {
                image: image.into(),
                state: FakeState::Running,
            },
        );
    }

    /// Marks the container as exited with `code`. No-op if it does not exist.
    pub async fn exit(&self, handle: &str, code: i64) {
        if let Some(container) = self.engine.lock().await.containers.get_mut(handle) {
            container.state = FakeState::Exited(code);
        }
    }

    pub async fn fail_start(&self, handle: impl Into<String>) {
        self.engine.lock().await.fail_start.insert(handle.into());
    }

    pub async fn fail_remove(&self, handle: impl Into<String>) {
        self.engine.lock().await.fail_remove.insert(handle.into());
    }

    pub async fn fail_probe(&self, handle: impl Into<String>) {
        self.engine.lock().await.fail_probe.insert(handle.into());
    }

    pub async fn set_list_failure(&self, fail: bool) {
        self.engine.lock().await.fail_list = fail;
    }

    /// Clears every injected failure.
    pub async fn heal(&self) {
        let mut engine = self.engine.lock().await;
        engine.fail_start.clear();
        engine.fail_remove.clear();
        engine.fail_probe.clear();
        engine.fail_list = false;
    }

    pub async fn state(&self, handle: &str) -> Option<FakeState> {
        self.engine
            .lock()
            .await
            .containers
            .get(handle)
            .map(|c| c.state)
    }

    pub async fn image(&self, handle: &str) -> Option<String> {
        self.engine
            .lock()
            .await
            .containers
            .get(handle)
            .map(|c| c.image.clone())
    }

    pub async fn calls(&self) -> Vec<EngineCall> {
        self.engine.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.engine.lock().await.calls.clear();
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start_container(&self, pod: &Pod) -> Result<(), RuntimeError> {
        let handle = container_name(pod);
        let mut guard = self.engine.lock().await;
        let engine = &mut *guard;

        if engine.fail_start.contains(&handle) {
            return Err(RuntimeError::execution(
                format!("fake run {}", handle),
                format!("Unable to find image '{}' locally", pod.image),
            ));
        }

        match engine.containers.get_mut(&handle) {
            Some(container) if container.state == FakeState::Running => {}
            Some(container) => {
                container.state = FakeState::Running;
                engine.calls.push(EngineCall::Resume(handle));
            }
            None => {
                engine.containers.insert(
                    handle.clone(),
                    FakeContainer {
                        image: pod.image.clone(),
                        state: FakeState::Running,
                    },
                );
                engine.calls.push(EngineCall::Create(handle));
            }
        }
        Ok(())
    }

    async fn stop_container(&self, pod: &Pod) -> Result<(), RuntimeError> {
        let handle = container_name(pod);
        let mut guard = self.engine.lock().await;
        let engine = &mut *guard;

        let Some(container) = engine.containers.get_mut(&handle) else {
            return Ok(());
        };
        if container.state == FakeState::Running {
            container.state = FakeState::Exited(137);
            engine.calls.push(EngineCall::Stop(handle.clone()));
        }

        if engine.fail_remove.contains(&handle) {
            return Err(RuntimeError::execution(
                format!("fake rm {}", handle),
                "removal of container is already in progress",
            ));
        }
        engine.containers.remove(&handle);
        engine.calls.push(EngineCall::Remove(handle));
        Ok(())
    }

    async fn container_status(&self, pod: &Pod) -> Result<PodStatus, RuntimeError> {
        let handle = container_name(pod);
        let engine = self.engine.lock().await;

        if engine.fail_probe.contains(&handle) {
            return Err(RuntimeError::execution(
                format!("fake inspect {}", handle),
                "probe failed",
            ));
        }

        Ok(match engine.containers.get(&handle).map(|c| c.state) {
            None => PodStatus::Pending,
            Some(FakeState::Running) => PodStatus::Running,
            Some(FakeState::Exited(0)) => PodStatus::Succeeded,
            Some(FakeState::Exited(_)) => PodStatus::Failed,
        })
    }

    async fn list_running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        let engine = self.engine.lock().await;
        if engine.fail_list {
            return Err(RuntimeError::execution("fake ps", "Cannot connect to the engine"));
        }

        Ok(engine
            .containers
            .iter()
            .filter(|(handle, c)| {
                c.state == FakeState::Running && handle.starts_with(HANDLE_PREFIX)
            })
            .map(|(handle, _)| handle.clone())
            .collect())
    }
}
