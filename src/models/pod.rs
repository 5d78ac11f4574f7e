use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PodStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Pending => "Pending",
            PodStatus::Running => "Running",
            PodStatus::Succeeded => "Succeeded",
            PodStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of desired work, keyed by `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: PodStatus,
    /// Empty when the pod has not been assigned to a node.
    #[serde(default)]
    pub node_name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Pod {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            image: image.into(),
            status: PodStatus::Pending,
            node_name: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn is_scheduled(&self) -> bool {
        !self.node_name.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodList {
    pub items: Vec<Pod>,
}

/// Body of a pod status write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: PodStatus,
}
