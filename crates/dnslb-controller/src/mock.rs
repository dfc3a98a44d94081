use crate::error::{ControllerError, Result};
use crate::fields::Indexable;
use crate::traits::{ClusterClient, ListParams};
use crate::watch::{EventStream, Reflected, Watches};
use async_trait::async_trait;
use dnslb_core::{Node, Object, ObjectKey, Pod, Resource, Service};
use futures_util::stream::{self, StreamExt};
use kube::runtime::watcher::Event;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Platform operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    GetService,
    ListPods,
    ListNodes,
    UpdateServiceStatus,
}

#[derive(Debug, Clone)]
enum MockChange {
    Applied(Object),
    Deleted(Object),
}

/// In-memory platform for tests and local runs
///
/// Objects are listed in key order. Every mutation made through the `apply_*`
/// and `delete_*` helpers, and every status write, is delivered to open
/// watches.
pub struct MockCluster {
    services: RwLock<BTreeMap<ObjectKey, Service>>,
    pods: RwLock<BTreeMap<ObjectKey, Pod>>,
    nodes: RwLock<BTreeMap<ObjectKey, Node>>,
    status_updates: Mutex<Vec<Service>>,
    failures: Mutex<HashMap<MockOperation, u32>>,
    calls: Mutex<HashMap<MockOperation, u32>>,
    latency: Mutex<Duration>,
    changes: broadcast::Sender<MockChange>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            services: RwLock::new(BTreeMap::new()),
            pods: RwLock::new(BTreeMap::new()),
            nodes: RwLock::new(BTreeMap::new()),
            status_updates: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            changes,
        }
    }

    pub fn apply_service(&self, service: Service) {
        apply(&self.services, service, &self.changes);
    }

    pub fn apply_pod(&self, pod: Pod) {
        apply(&self.pods, pod, &self.changes);
    }

    pub fn apply_node(&self, node: Node) {
        apply(&self.nodes, node, &self.changes);
    }

    pub fn delete_service(&self, namespace: &str, name: &str) -> Option<Service> {
        delete(&self.services, &ObjectKey::new(namespace, name), &self.changes)
    }

    pub fn delete_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        delete(&self.pods, &ObjectKey::new(namespace, name), &self.changes)
    }

    pub fn delete_node(&self, name: &str) -> Option<Node> {
        delete(&self.nodes, &ObjectKey::cluster_scoped(name), &self.changes)
    }

    /// Current stored copy of a service
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services
            .read()
            .get(&ObjectKey::new(namespace, name))
            .cloned()
    }

    /// Every accepted status write, oldest first
    pub fn status_updates(&self) -> Vec<Service> {
        self.status_updates.lock().clone()
    }

    /// Make the next call of `operation` fail with an API error
    pub fn fail_next(&self, operation: MockOperation) {
        *self.failures.lock().entry(operation).or_insert(0) += 1;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of calls made for `operation`, failed ones included
    pub fn call_count(&self, operation: MockOperation) -> u32 {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Watch one kind the way the API server's watcher reports it
    ///
    /// The stream starts with a full listing (`Init`, one `InitApply` per
    /// object, `InitDone`) and then follows every change.
    pub fn watch<K: Resource>(&self) -> EventStream<K> {
        // Subscribe first so nothing between the listing and the watch is lost
        let rx = self.changes.subscribe();

        let listed: Vec<Event<K>> = self
            .snapshot()
            .into_iter()
            .filter_map(K::from_object)
            .map(Event::InitApply)
            .collect();
        let initial = std::iter::once(Event::Init)
            .chain(listed)
            .chain(std::iter::once(Event::InitDone))
            .map(Ok)
            .collect::<Vec<_>>();

        let live = BroadcastStream::new(rx).filter_map(|item| async move {
            let change = match item {
                Ok(change) => change,
                Err(e) => {
                    warn!("Mock watch lagged: {}", e);
                    return None;
                }
            };
            let event = match change {
                MockChange::Applied(object) => Event::Apply(K::from_object(object)?),
                MockChange::Deleted(object) => Event::Delete(K::from_object(object)?),
            };
            Some(Ok(event))
        });

        stream::iter(initial).chain(live).boxed()
    }

    /// Reflected watches of all three kinds
    pub fn watches(&self) -> Watches {
        Watches {
            services: Reflected::new(self.watch::<Service>()),
            pods: Reflected::new(self.watch::<Pod>()),
            nodes: Reflected::new(self.watch::<Node>()),
        }
    }

    fn snapshot(&self) -> Vec<Object> {
        let services = self.services.read();
        let pods = self.pods.read();
        let nodes = self.nodes.read();
        services
            .values()
            .cloned()
            .map(Object::Service)
            .chain(pods.values().cloned().map(Object::Pod))
            .chain(nodes.values().cloned().map(Object::Node))
            .collect()
    }

    async fn enter(&self, operation: MockOperation) -> Result<()> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&operation).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(ControllerError::api_error(
                format!("{:?}", operation),
                "injected failure",
            ));
        }
        Ok(())
    }
}

fn apply<R: Resource>(
    store: &RwLock<BTreeMap<ObjectKey, R>>,
    object: R,
    changes: &broadcast::Sender<MockChange>,
) {
    let Ok(key) = object.object_key() else {
        return;
    };
    store.write().insert(key, object.clone());
    // No receivers just means nobody is watching yet
    let _ = changes.send(MockChange::Applied(object.into_object()));
}

fn delete<R: Resource>(
    store: &RwLock<BTreeMap<ObjectKey, R>>,
    key: &ObjectKey,
    changes: &broadcast::Sender<MockChange>,
) -> Option<R> {
    let removed = store.write().remove(key)?;
    let _ = changes.send(MockChange::Deleted(removed.clone().into_object()));
    Some(removed)
}

fn list<R: Indexable>(store: &RwLock<BTreeMap<ObjectKey, R>>, params: &ListParams) -> Vec<R> {
    store
        .read()
        .values()
        .filter(|obj| params.matches(*obj))
        .cloned()
        .collect()
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.enter(MockOperation::GetService).await?;
        Ok(self.service(namespace, name))
    }

    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>> {
        self.enter(MockOperation::ListPods).await?;
        Ok(list(&self.pods, params))
    }

    async fn list_nodes(&self, params: &ListParams) -> Result<Vec<Node>> {
        self.enter(MockOperation::ListNodes).await?;
        Ok(list(&self.nodes, params))
    }

    /// Only the status of the stored object changes, as with a status subresource
    async fn update_service_status(&self, service: &Service) -> Result<Service> {
        self.enter(MockOperation::UpdateServiceStatus).await?;
        let key = service.object_key()?;

        let updated = {
            let mut services = self.services.write();
            let stored = services
                .get_mut(&key)
                .ok_or_else(|| ControllerError::service_not_found(key.to_string()))?;
            stored.status = service.status.clone();
            stored.clone()
        };

        debug!("Mock: status written for service {}", key);
        self.status_updates.lock().push(updated.clone());
        let _ = self
            .changes
            .send(MockChange::Applied(Object::Service(updated.clone())));
        Ok(updated)
    }
}
