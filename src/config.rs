use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "m8s", version, about = "Minimal single-node container orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the pod and node records over HTTP.
    Apiserver(ApiServerConfig),
    /// Run the node agent that keeps containers in line with the API server.
    Kubelet(KubeletConfig),
}

#[derive(Debug, Clone, Args)]
pub struct ApiServerConfig {
    /// JSON file holding the pod and node records. Its directory must exist.
    #[arg(long, env = "M8S_STATE_FILE", default_value = "/var/lib/m8s/state.json")]
    pub state_file: PathBuf,

    #[arg(long, env = "M8S_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Args)]
pub struct KubeletConfig {
    /// Pods whose nodeName equals this are run here.
    #[arg(long, env = "M8S_NODE_NAME", default_value = "node-01")]
    pub node_name: String,

    #[arg(long, env = "M8S_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Seconds between sync passes.
    #[arg(
        long,
        env = "M8S_SYNC_INTERVAL",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sync_interval: u64,

    /// Container engine command (docker-compatible CLI).
    #[arg(long, env = "M8S_ENGINE", default_value = "docker")]
    pub engine: String,
}

impl KubeletConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }
}
