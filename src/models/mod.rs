pub mod node;
pub mod pod;

pub use node::{Node, NodeList, NodeStatus};
pub use pod::{Pod, PodList, PodStatus, StatusUpdate, DEFAULT_NAMESPACE};
