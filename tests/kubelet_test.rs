mod common;

use async_trait::async_trait;
use common::{pod_on_node, temp_storage, NODE};
use m8s::client::ApiClient;
use m8s::error::{RuntimeError, SourceError, StoreError, SyncError};
use m8s::models::{Pod, PodStatus};
use m8s::runtime::fake::{EngineCall, FakeRuntime, FakeState};
use m8s::runtime::{ContainerRuntime, Kubelet, PodSource, SyncReport};
use m8s::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn kubelet(storage: &Storage, runtime: &FakeRuntime) -> Kubelet {
    Kubelet::new(NODE, Arc::new(storage.clone()), Arc::new(runtime.clone()))
}

async fn status_of(storage: &Storage, name: &str) -> PodStatus {
    storage.pods().get("default", name).await.unwrap().status
}

#[tokio::test]
async fn test_start_then_orphan_cleanup_scenario() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx:latest")).await.unwrap();

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.status_updates, 1);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Running);
    assert_eq!(runtime.state("m8s-default-web").await, Some(FakeState::Running));
    assert_eq!(runtime.image("m8s-default-web").await.as_deref(), Some("nginx:latest"));

    storage.pods().delete("default", "web").await.unwrap();
    runtime.clear_calls().await;

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.orphans_stopped, 1);
    assert_eq!(
        runtime.calls().await,
        vec![
            EngineCall::Stop("m8s-default-web".into()),
            EngineCall::Remove("m8s-default-web".into()),
        ]
    );
    assert_eq!(runtime.state("m8s-default-web").await, None);
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx:latest")).await.unwrap();
    storage.pods().create(pod_on_node("db", "postgres:16")).await.unwrap();
    runtime.insert_running("m8s-default-stale", "busybox").await;

    kubelet.sync_pods().await.unwrap();
    let after_first = storage.pods().list().await;
    runtime.clear_calls().await;

    let report = kubelet.sync_pods().await.unwrap();
    assert!(report.is_quiet(), "second pass did work: {:?}", report);
    assert_eq!(report.pods, 2);
    assert!(runtime.calls().await.is_empty());
    assert_eq!(storage.pods().list().await, after_first);
}

#[tokio::test]
async fn test_start_failure_is_isolated() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("broken", "no-such-image")).await.unwrap();
    storage.pods().create(pod_on_node("web", "nginx:latest")).await.unwrap();
    runtime.fail_start("m8s-default-broken").await;

    let report = kubelet.sync_pods().await.unwrap();

    assert_eq!(report.start_failures, 1);
    assert_eq!(report.started, 1);
    assert_eq!(status_of(&storage, "broken").await, PodStatus::Failed);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Running);

    // A pod already recorded as failed is not rewritten while the start keeps failing.
    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.start_failures, 1);
    assert_eq!(report.status_updates, 0);
}

#[tokio::test]
async fn test_only_pods_for_this_node_are_run() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage
        .pods()
        .create(Pod::new("elsewhere", "default", "nginx").on_node("node-02"))
        .await
        .unwrap();
    storage
        .pods()
        .create(Pod::new("unscheduled", "default", "nginx"))
        .await
        .unwrap();

    let report = kubelet.sync_pods().await.unwrap();

    assert_eq!(report, SyncReport::default());
    assert!(runtime.calls().await.is_empty());
    assert_eq!(status_of(&storage, "elsewhere").await, PodStatus::Pending);
    assert_eq!(status_of(&storage, "unscheduled").await, PodStatus::Pending);
}

#[tokio::test]
async fn test_pod_moved_to_other_node_is_stopped_here() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    let pod = storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    kubelet.sync_pods().await.unwrap();

    let mut moved = storage.pods().get("default", "web").await.unwrap();
    moved.node_name = "node-02".to_string();
    storage.pods().update(moved).await.unwrap();

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.orphans_stopped, 1);
    assert_eq!(runtime.state(&m8s::runtime::container_name(&pod)).await, None);
}

#[tokio::test]
async fn test_stopped_container_is_resumed_not_recreated() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    kubelet.sync_pods().await.unwrap();
    runtime.exit("m8s-default-web", 1).await;
    runtime.clear_calls().await;

    kubelet.sync_pods().await.unwrap();

    assert_eq!(runtime.calls().await, vec![EngineCall::Resume("m8s-default-web".into())]);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Running);
}

#[tokio::test]
async fn test_probe_failure_marks_pod_failed() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    runtime.fail_probe("m8s-default-web").await;

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Failed);

    runtime.heal().await;
    kubelet.sync_pods().await.unwrap();
    assert_eq!(status_of(&storage, "web").await, PodStatus::Running);
}

#[tokio::test]
async fn test_orphans_with_odd_names() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    runtime.insert_running("m8s-team-a-cache", "redis:7").await;
    runtime.insert_running("m8s-bogus", "busybox").await;
    runtime.insert_running("postgres", "postgres:16").await;

    let report = kubelet.sync_pods().await.unwrap();

    assert_eq!(report.orphans_stopped, 1);
    assert_eq!(report.orphan_failures, 1);
    assert_eq!(runtime.state("m8s-team-a-cache").await, None);
    assert_eq!(runtime.state("m8s-bogus").await, Some(FakeState::Running));
    assert_eq!(runtime.state("postgres").await, Some(FakeState::Running));
}

#[tokio::test]
async fn test_orphan_stop_failure_does_not_abort_pass() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    runtime.insert_running("m8s-default-old", "busybox").await;
    runtime.insert_running("m8s-default-older", "busybox").await;
    runtime.fail_remove("m8s-default-old").await;

    let report = kubelet.sync_pods().await.unwrap();

    assert_eq!(report.started, 1);
    assert_eq!(report.orphans_stopped, 1);
    assert_eq!(report.orphan_failures, 1);
    assert_eq!(runtime.state("m8s-default-older").await, None);
    assert_eq!(runtime.state("m8s-default-old").await, Some(FakeState::Exited(137)));

    // The half-stopped container is no longer running, so it is no longer an orphan.
    runtime.heal().await;
    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.orphan_failures, 0);
}

#[tokio::test]
async fn test_container_listing_failure_aborts_pass() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    runtime.set_list_failure(true).await;

    let err = kubelet.sync_pods().await.unwrap_err();
    assert!(matches!(err, SyncError::Runtime(_)));
    assert!(runtime.calls().await.is_empty());
    assert_eq!(status_of(&storage, "web").await, PodStatus::Pending);
}

#[tokio::test]
async fn test_unreachable_api_server_aborts_pass() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let runtime = FakeRuntime::new();
    let client = ApiClient::new(format!("http://{}", addr)).unwrap();
    let kubelet = Kubelet::new(NODE, Arc::new(client), Arc::new(runtime.clone()));

    let err = kubelet.sync_pods().await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert!(runtime.calls().await.is_empty());
}

/// Serves a fixed pod list and rejects every status write, like an API server
/// whose pods were deleted after they were listed.
struct VanishingPods(Vec<Pod>);

#[async_trait]
impl PodSource for VanishingPods {
    async fn list_pods(&self) -> Result<Vec<Pod>, SourceError> {
        Ok(self.0.clone())
    }

    async fn update_pod_status(&self, pod: &Pod, _status: PodStatus) -> Result<(), SourceError> {
        Err(StoreError::NotFound {
            kind: "pod",
            key: format!("{}/{}", pod.namespace, pod.name),
        }
        .into())
    }
}

#[tokio::test]
async fn test_status_write_failure_is_counted_not_fatal() {
    let runtime = FakeRuntime::new();
    let source = VanishingPods(vec![pod_on_node("web", "nginx"), pod_on_node("api", "nginx")]);
    let kubelet = Kubelet::new(NODE, Arc::new(source), Arc::new(runtime.clone()));

    let report = kubelet.sync_pods().await.unwrap();

    assert_eq!(report.started, 2);
    assert_eq!(report.status_update_failures, 2);
    assert_eq!(report.status_updates, 0);
}

/// Accepts every start but never has a container to show for it.
struct ForgetfulRuntime;

#[async_trait]
impl ContainerRuntime for ForgetfulRuntime {
    async fn start_container(&self, _pod: &Pod) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stop_container(&self, _pod: &Pod) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn container_status(&self, _pod: &Pod) -> Result<PodStatus, RuntimeError> {
        Ok(PodStatus::Pending)
    }

    async fn list_running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_container_missing_after_start_marks_pod_failed() {
    let (_dir, storage) = temp_storage().await;
    let kubelet = Kubelet::new(NODE, Arc::new(storage.clone()), Arc::new(ForgetfulRuntime));

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    storage
        .pods()
        .update_status("default", "web", PodStatus::Running)
        .await
        .unwrap();

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Failed);

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.status_updates, 0);
    assert_eq!(status_of(&storage, "web").await, PodStatus::Failed);
}

#[tokio::test]
async fn test_pods_sharing_a_container_name_only_first_runs() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    let first = Pod::new("b-c", "a", "nginx").on_node(NODE);
    let second = Pod::new("c", "a-b", "redis").on_node(NODE);
    storage.pods().create(first).await.unwrap();
    storage.pods().create(second).await.unwrap();

    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.start_failures, 1);
    assert_eq!(report.orphans_stopped, 0);
    assert_eq!(runtime.calls().await, vec![EngineCall::Create("m8s-a-b-c".into())]);
    assert_eq!(runtime.image("m8s-a-b-c").await.as_deref(), Some("nginx"));

    let pods = storage.pods();
    assert_eq!(pods.get("a", "b-c").await.unwrap().status, PodStatus::Running);
    assert_eq!(pods.get("a-b", "c").await.unwrap().status, PodStatus::Failed);

    runtime.clear_calls().await;
    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.status_updates, 0);
    assert!(runtime.calls().await.is_empty());
    assert_eq!(runtime.state("m8s-a-b-c").await, Some(FakeState::Running));
}

#[tokio::test]
async fn test_sync_over_http() {
    let (_dir, storage) = temp_storage().await;
    let (url, _shutdown) = common::spawn_server(storage.clone()).await;
    let runtime = FakeRuntime::new();
    let kubelet = Kubelet::new(
        NODE,
        Arc::new(ApiClient::new(url).unwrap()),
        Arc::new(runtime.clone()),
    );

    storage.pods().create(pod_on_node("web", "nginx:latest")).await.unwrap();
    kubelet.sync_pods().await.unwrap();
    assert_eq!(status_of(&storage, "web").await, PodStatus::Running);

    storage.pods().delete("default", "web").await.unwrap();
    let report = kubelet.sync_pods().await.unwrap();
    assert_eq!(report.orphans_stopped, 1);
    assert_eq!(runtime.state("m8s-default-web").await, None);
}

#[tokio::test]
async fn test_run_syncs_eagerly_and_stops_on_shutdown() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime).with_sync_interval(Duration::from_secs(3600));
    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let agent = tokio::spawn(async move { kubelet.run(rx).await });

    let started = tokio::time::timeout(Duration::from_secs(5), async {
        while status_of(&storage, "web").await != PodStatus::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "eager pass did not run");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .expect("kubelet did not stop")
        .unwrap();
    assert_eq!(runtime.calls().await, vec![EngineCall::Create("m8s-default-web".into())]);
}

#[tokio::test]
async fn test_run_stops_when_shutdown_sender_dropped() {
    let (_dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime).with_sync_interval(Duration::from_secs(3600));

    let (tx, rx) = watch::channel(false);
    let agent = tokio::spawn(async move { kubelet.run(rx).await });
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .expect("kubelet did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_back_to_back_passes_leave_identical_state() {
    let (dir, storage) = temp_storage().await;
    let runtime = FakeRuntime::new();
    let kubelet = kubelet(&storage, &runtime);

    storage.pods().create(pod_on_node("web", "nginx")).await.unwrap();
    storage.pods().create(pod_on_node("job", "busybox")).await.unwrap();
    runtime.fail_start("m8s-default-job").await;

    kubelet.sync_pods().await.unwrap();
    let first = std::fs::read_to_string(common::state_path(&dir)).unwrap();
    kubelet.sync_pods().await.unwrap();
    let second = std::fs::read_to_string(common::state_path(&dir)).unwrap();

    assert_eq!(first, second);
}
