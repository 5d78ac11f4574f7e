use std::sync::Arc;
use tracing::info;

use super::Inner;
use crate::error::StoreError;
use crate::models::{Pod, PodStatus, DEFAULT_NAMESPACE};

pub struct PodStore {
    inner: Arc<Inner>,
}

impl PodStore {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub async fn create(&self, mut pod: Pod) -> Result<Pod, StoreError> {
        normalize(&mut pod);
        validate(&pod)?;

        let created = self
            .inner
            .mutate(|state| {
                if position(&state.pods, &pod.namespace, &pod.name).is_some() {
                    return Err(StoreError::AlreadyExists {
                        kind: "pod",
                        key: format!("{}/{}", pod.namespace, pod.name),
                    });
                }
                state.pods.push(pod.clone());
                Ok(pod)
            })
            .await?;

        info!("Created pod {}/{}", created.namespace, created.name);
        Ok(created)
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        let state = self.inner.read().await;
        position(&state.pods, namespace, name)
            .map(|i| state.pods[i].clone())
            .ok_or_else(|| StoreError::pod_not_found(namespace, name))
    }

    /// All pods, in insertion order.
    pub async fn list(&self) -> Vec<Pod> {
        self.inner.read().await.pods.clone()
    }

    pub async fn list_namespace(&self, namespace: &str) -> Vec<Pod> {
        self.inner
            .read()
            .await
            .pods
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Replaces the stored pod wholesale. The creation timestamp is kept from the
    /// stored record.
    pub async fn update(&self, mut pod: Pod) -> Result<Pod, StoreError> {
        normalize(&mut pod);
        validate(&pod)?;
        self.inner
            .mutate(|state| {
                let i = position(&state.pods, &pod.namespace, &pod.name)
                    .ok_or_else(|| StoreError::pod_not_found(&pod.namespace, &pod.name))?;
                pod.created_at = state.pods[i].created_at;
                state.pods[i] = pod.clone();
                Ok(pod)
            })
            .await
    }

    pub async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: PodStatus,
    ) -> Result<Pod, StoreError> {
        self.inner
            .mutate(|state| {
                let i = position(&state.pods, namespace, name)
                    .ok_or_else(|| StoreError::pod_not_found(namespace, name))?;
                state.pods[i].status = status;
                Ok(state.pods[i].clone())
            })
            .await
    }

    /// Removes the pod and returns the record that was stored.
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        let removed = self
            .inner
            .mutate(|state| {
                let i = position(&state.pods, namespace, name)
                    .ok_or_else(|| StoreError::pod_not_found(namespace, name))?;
                Ok(state.pods.remove(i))
            })
            .await?;

        info!("Deleted pod {}/{}", namespace, name);
        Ok(removed)
    }
}

fn normalize(pod: &mut Pod) {
    if pod.namespace.is_empty() {
        pod.namespace = DEFAULT_NAMESPACE.to_string();
    }
}

fn validate(pod: &Pod) -> Result<(), StoreError> {
    if pod.name.is_empty() {
        return Err(StoreError::InvalidPod("pod name is required".into()));
    }
    if pod.image.is_empty() {
        return Err(StoreError::InvalidPod("pod image is required".into()));
    }
    Ok(())
}

fn position(pods: &[Pod], namespace: &str, name: &str) -> Option<usize> {
    pods.iter()
        .position(|p| p.namespace == namespace && p.name == name)
}
