use std::path::PathBuf;

use thiserror::Error;

/// Failures of the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("invalid pod: {0}")]
    InvalidPod(String),

    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// The persisted document exists but cannot be loaded. Never recovered from.
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn pod_not_found(namespace: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: "pod",
            key: format!("{}/{}", namespace, name),
        }
    }

    pub(crate) fn node_not_found(name: &str) -> Self {
        StoreError::NotFound {
            kind: "node",
            key: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Failures of the container engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("`{command}` failed: {output}")]
    Execution { command: String, output: String },
}

impl RuntimeError {
    pub fn execution(command: impl Into<String>, output: impl Into<String>) -> Self {
        RuntimeError::Execution {
            command: command.into(),
            output: output.into(),
        }
    }
}

/// Failures talking to the API server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to API server failed: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors reported by a pod source, whatever transport it uses.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that abort a single sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to get pods: {0}")]
    Source(#[source] SourceError),

    #[error("failed to list running containers: {0}")]
    Runtime(#[source] RuntimeError),
}
