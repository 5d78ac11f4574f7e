pub mod docker;
pub mod fake;
pub mod handle;
pub mod kubelet;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::models::{Pod, PodStatus};

pub use docker::DockerCli;
pub use fake::FakeRuntime;
pub use handle::{container_name, parse_handle, HandleIdentity, HANDLE_PREFIX};
pub use kubelet::{Kubelet, PodSource, SyncReport};

/// Lifecycle operations against a container engine, keyed by a pod's container handle.
///
/// Every call blocks on the engine and returns once the engine has answered.
/// Implementations never retry; retry policy belongs to the caller.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates and starts the pod's container, resumes it if it is stopped, and
    /// does nothing if it is already running.
    async fn start_container(&self, pod: &Pod) -> Result<(), RuntimeError>;

    /// Stops and removes the pod's container. Succeeds if there is none.
    async fn stop_container(&self, pod: &Pod) -> Result<(), RuntimeError>;

    /// Observes the container without changing it.
    async fn container_status(&self, pod: &Pod) -> Result<PodStatus, RuntimeError>;

    /// Handles of all running containers managed by m8s.
    async fn list_running_containers(&self) -> Result<Vec<String>, RuntimeError>;
}
