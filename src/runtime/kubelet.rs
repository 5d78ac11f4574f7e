use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::handle::{container_name, parse_handle};
use super::ContainerRuntime;
use crate::error::{SourceError, SyncError};
use crate::models::{Pod, PodStatus};
use crate::Storage;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Where the kubelet reads desired pods from and reports status to.
#[async_trait]
pub trait PodSource: Send + Sync {
    async fn list_pods(&self) -> Result<Vec<Pod>, SourceError>;

    async fn update_pod_status(&self, pod: &Pod, status: PodStatus) -> Result<(), SourceError>;
}

#[async_trait]
impl PodSource for Storage {
    async fn list_pods(&self) -> Result<Vec<Pod>, SourceError> {
        Ok(self.pods().list().await)
    }

    async fn update_pod_status(&self, pod: &Pod, status: PodStatus) -> Result<(), SourceError> {
        self.pods()
            .update_status(&pod.namespace, &pod.name, status)
            .await?;
        Ok(())
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Desired pods assigned to this node.
    pub pods: usize,
    pub started: usize,
    pub start_failures: usize,
    pub status_updates: usize,
    pub status_update_failures: usize,
    pub orphans_stopped: usize,
    pub orphan_failures: usize,
}

impl SyncReport {
    /// True when the pass changed nothing and hit no errors.
    pub fn is_quiet(&self) -> bool {
        self.started == 0
            && self.start_failures == 0
            && self.status_updates == 0
            && self.status_update_failures == 0
            && self.orphans_stopped == 0
            && self.orphan_failures == 0
    }
}

/// Node agent: converges the containers on this node towards the desired pods.
pub struct Kubelet {
    source: Arc<dyn PodSource>,
    runtime: Arc<dyn ContainerRuntime>,
    node_name: String,
    sync_interval: Duration,
}

impl Kubelet {
    pub fn new(
        node_name: impl Into<String>,
        source: Arc<dyn PodSource>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            source,
            runtime,
            node_name: node_name.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Runs sync passes until `shutdown` turns true or its sender is dropped.
    ///
    /// The first pass runs immediately. Shutdown is only observed between
    /// passes, so a pass that has started always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting kubelet on node {} (sync every {:?})",
            self.node_name, self.sync_interval
        );

        let mut ticker = tokio::time::interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.sync_pods().await {
                Ok(report) if report.is_quiet() => debug!("Sync complete: {:?}", report),
                Ok(report) => info!("Sync complete: {:?}", report),
                Err(e) => error!("Kubelet sync error: {}", e),
            }
        }

        info!("Kubelet on node {} stopped", self.node_name);
    }

    /// One reconciliation pass.
    ///
    /// Only failing to read the desired pods or the running containers aborts
    /// the pass. Failures for individual pods are logged, reported as `Failed`
    /// where they concern a desired pod, and counted in the report.
    pub async fn sync_pods(&self) -> Result<SyncReport, SyncError> {
        let desired_pods = self.source.list_pods().await.map_err(SyncError::Source)?;
        let running: HashSet<String> = self
            .runtime
            .list_running_containers()
            .await
            .map_err(SyncError::Runtime)?
            .into_iter()
            .collect();

        let mut report = SyncReport::default();
        let mut desired_handles = HashSet::new();

        for pod in desired_pods.iter().filter(|p| p.node_name == self.node_name) {
            report.pods += 1;
            let handle = container_name(pod);

            if !desired_handles.insert(handle.clone()) {
                error!(
                    "Pod {}/{} maps to container {} which belongs to another pod",
                    pod.namespace, pod.name, handle
                );
                report.start_failures += 1;
                if pod.status != PodStatus::Failed {
                    self.report_status(pod, PodStatus::Failed, &mut report).await;
                }
                continue;
            }

            let attempted_start = !running.contains(&handle);
            if attempted_start {
                info!("Starting pod {}/{}", pod.namespace, pod.name);
                if let Err(e) = self.runtime.start_container(pod).await {
                    error!("Failed to start pod {}/{}: {}", pod.namespace, pod.name, e);
                    report.start_failures += 1;
                    if pod.status != PodStatus::Failed {
                        self.report_status(pod, PodStatus::Failed, &mut report).await;
                    }
                    continue;
                }
                report.started += 1;
            }

            let observed = match self.runtime.container_status(pod).await {
                Ok(PodStatus::Pending) if attempted_start => {
                    warn!(
                        "Container {} for pod {}/{} is missing after start",
                        handle, pod.namespace, pod.name
                    );
                    PodStatus::Failed
                }
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        "Failed to get status for pod {}/{}: {}",
                        pod.namespace, pod.name, e
                    );
                    PodStatus::Failed
                }
            };

            if observed != pod.status {
                self.report_status(pod, observed, &mut report).await;
            }
        }

        for handle in running.iter().filter(|h| !desired_handles.contains(*h)) {
            info!("Stopping unexpected container {}", handle);

            let Some(identity) = parse_handle(handle) else {
                warn!("Cannot derive a pod identity from container {}", handle);
                report.orphan_failures += 1;
                continue;
            };
            if identity.ambiguous {
                warn!(
                    "Container {} maps to more than one pod identity, assuming {}/{}",
                    handle, identity.namespace, identity.name
                );
            }

            match self.runtime.stop_container(&identity.to_pod()).await {
                Ok(()) => report.orphans_stopped += 1,
                Err(e) => {
                    error!("Failed to stop container {}: {}", handle, e);
                    report.orphan_failures += 1;
                }
            }
        }

        Ok(report)
    }

    async fn report_status(&self, pod: &Pod, status: PodStatus, report: &mut SyncReport) {
        info!(
            "Pod {}/{} status: {} -> {}",
            pod.namespace, pod.name, pod.status, status
        );
        match self.source.update_pod_status(pod, status).await {
            Ok(()) => report.status_updates += 1,
            Err(e) => {
                error!(
                    "Failed to update status for pod {}/{}: {}",
                    pod.namespace, pod.name, e
                );
                report.status_update_failures += 1;
            }
        }
    }
}
