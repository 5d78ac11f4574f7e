// Container engine adapter that shells out to the docker CLI (or anything
// command-compatible with it, e.g. podman).
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::handle::{container_name, HANDLE_PREFIX};
use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::models::{Pod, PodStatus};

const STATE_FORMAT: &str = "{{.State.Status}} {{.State.ExitCode}}";

pub struct DockerCli {
    command: String,
}

impl DockerCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the engine and returns its stdout. A non-zero exit becomes an
    /// execution error carrying stdout and stderr.
    async fn exec(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let rendered = format!("{} {}", self.command, args.join(" "));
        debug!("Running {}", rendered);

        let output = Command::new(&self.command)
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::execution(&rendered, e.to_string()))?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
            let diagnostic = match diagnostic.trim() {
                "" => output.status.to_string(),
                text => text.to_string(),
            };
            return Err(RuntimeError::execution(rendered, diagnostic));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn container_exists(&self, handle: &str) -> Result<bool, RuntimeError> {
        let filter = exact_name_filter(handle);
        let output = self
            .exec(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        Ok(names_contain(&output, handle))
    }

    async fn inspect_state(&self, handle: &str) -> Result<(String, i64), RuntimeError> {
        let output = self
            .exec(&["inspect", "--format", STATE_FORMAT, handle])
            .await?;
        parse_state(&output).ok_or_else(|| {
            RuntimeError::execution(
                format!("{} inspect {}", self.command, handle),
                format!("unexpected inspect output: {:?}", output.trim()),
            )
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start_container(&self, pod: &Pod) -> Result<(), RuntimeError> {
        let handle = container_name(pod);

        if !self.container_exists(&handle).await? {
            info!("Creating container {} with image {}", handle, pod.image);
            self.exec(&["run", "-d", "--name", &handle, &pod.image])
                .await?;
            return Ok(());
        }

        let (state, _) = self.inspect_state(&handle).await?;
        if is_running_state(&state) {
            return Ok(());
        }

        info!("Resuming stopped container {}", handle);
        self.exec(&["start", &handle]).await?;
        Ok(())
    }

    async fn stop_container(&self, pod: &Pod) -> Result<(), RuntimeError> {
        let handle = container_name(pod);

        if !self.container_exists(&handle).await? {
            return Ok(());
        }

        // `stop` on an already stopped container succeeds, so a retry after a
        // failed `rm` goes straight through to removal.
        info!("Stopping container {}", handle);
        self.exec(&["stop", &handle]).await?;

        info!("Removing container {}", handle);
        self.exec(&["rm", &handle]).await?;
        Ok(())
    }

    async fn container_status(&self, pod: &Pod) -> Result<PodStatus, RuntimeError> {
        let handle = container_name(pod);

        if !self.container_exists(&handle).await? {
            return Ok(PodStatus::Pending);
        }

        let (state, exit_code) = self.inspect_state(&handle).await?;
        Ok(classify(&state, exit_code))
    }

    async fn list_running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        let filter = format!("name=^{}", HANDLE_PREFIX);
        let output = self
            .exec(&["ps", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        Ok(managed_names(&output))
    }
}

fn exact_name_filter(handle: &str) -> String {
    format!("name=^{}$", handle)
}

fn names_contain(output: &str, handle: &str) -> bool {
    output.lines().any(|line| line.trim() == handle)
}

/// Names from `ps --format {{.Names}}` output that carry the handle prefix.
fn managed_names(output: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.starts_with(HANDLE_PREFIX) && !names.iter().any(|n| n == line) {
            names.push(line.to_string());
        }
    }
    names
}

/// Parses `<status> <exit code>` as printed by [`STATE_FORMAT`].
fn parse_state(output: &str) -> Option<(String, i64)> {
    let mut fields = output.split_whitespace();
    let status = fields.next()?;
    let exit_code = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((status.to_string(), exit_code))
}

fn is_running_state(state: &str) -> bool {
    matches!(state, "running" | "restarting")
}

fn classify(state: &str, exit_code: i64) -> PodStatus {
    if is_running_state(state) {
        PodStatus::Running
    } else if state == "exited" && exit_code == 0 {
        PodStatus::Succeeded
    } else {
        PodStatus::Failed
    }
}
