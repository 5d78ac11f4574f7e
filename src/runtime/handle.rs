use crate::models::Pod;

pub const HANDLE_PREFIX: &str = "m8s-";

/// The container name used for a pod: `m8s-<namespace>-<name>`.
pub fn container_name(pod: &Pod) -> String {
    handle_for(&pod.namespace, &pod.name)
}

pub fn handle_for(namespace: &str, name: &str) -> String {
    format!("{}{}-{}", HANDLE_PREFIX, namespace, name)
}

/// Pod identity recovered from a container handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleIdentity {
    pub namespace: String,
    pub name: String,
    /// More than one split of the handle was possible. The namespace was taken
    /// up to the first `-`.
    pub ambiguous: bool,
}

impl HandleIdentity {
    /// A pod carrying only the identity, enough to address its container.
    pub fn to_pod(&self) -> Pod {
        Pod::new(self.name.clone(), self.namespace.clone(), "")
    }
}

/// Best-effort inverse of [`container_name`].
///
/// Returns `None` when the handle lacks the prefix or a non-empty namespace and
/// name. Whatever split is chosen, `container_name(&identity.to_pod())` is the
/// original handle.
pub fn parse_handle(handle: &str) -> Option<HandleIdentity> {
    let rest = handle.strip_prefix(HANDLE_PREFIX)?;
    let (namespace, name) = rest.split_once('-')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }

    Some(HandleIdentity {
        namespace: namespace.to_string(),
        name: name.to_string(),
        ambiguous: name.contains('-'),
    })
}
