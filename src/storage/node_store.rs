use std::sync::Arc;
use tracing::info;

use super::Inner;
use crate::error::StoreError;
use crate::models::Node;

pub struct NodeStore {
    inner: Arc<Inner>,
}

impl NodeStore {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub async fn create(&self, node: Node) -> Result<Node, StoreError> {
        if node.name.is_empty() {
            return Err(StoreError::InvalidNode("node name is required".into()));
        }

        let created = self
            .inner
            .mutate(|state| {
                if state.nodes.iter().any(|n| n.name == node.name) {
                    return Err(StoreError::AlreadyExists {
                        kind: "node",
                        key: node.name.clone(),
                    });
                }
                state.nodes.push(node.clone());
                Ok(node)
            })
            .await?;

        info!("Registered node {}", created.name);
        Ok(created)
    }

    pub async fn get(&self, name: &str) -> Result<Node, StoreError> {
        self.inner
            .read()
            .await
            .nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| StoreError::node_not_found(name))
    }

    pub async fn list(&self) -> Vec<Node> {
        self.inner.read().await.nodes.clone()
    }

    pub async fn update(&self, mut node: Node) -> Result<Node, StoreError> {
        self.inner
            .mutate(|state| {
                let existing = state
                    .nodes
                    .iter_mut()
                    .find(|n| n.name == node.name)
                    .ok_or_else(|| StoreError::node_not_found(&node.name))?;
                node.created_at = existing.created_at;
                *existing = node.clone();
                Ok(node)
            })
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<Node, StoreError> {
        let removed = self
            .inner
            .mutate(|state| {
                let i = state
                    .nodes
                    .iter()
                    .position(|n| n.name == name)
                    .ok_or_else(|| StoreError::node_not_found(name))?;
                Ok(state.nodes.remove(i))
            })
            .await?;

        info!("Removed node {}", name);
        Ok(removed)
    }
}
