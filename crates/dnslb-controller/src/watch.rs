//! Watch streams and the reflector stores they keep current
//!
//! Every watched kind is reflected into a `Store` before anything else sees
//! its events. The reflected events are then turned into [`ChangeEvent`]s and
//! passed through the relevance filter; only admitted objects reach the
//! controller's triggers.

use crate::filter;
use dnslb_core::{ChangeEvent, Node, ObjectKey, Pod, Resource, Service};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use tracing::{trace, warn};

/// Server-side watch timeout, kept below the client read timeout so idle
/// watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Raw watch events of one kind
pub type EventStream<K> = BoxStream<'static, Result<Event<K>, watcher::Error>>;

/// A watch stream together with the store it feeds
pub struct Reflected<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    pub store: Store<K>,
    pub events: EventStream<K>,
}

impl<K> Reflected<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Reflect `events` into a fresh store
    ///
    /// The store only changes as the returned stream is polled.
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = Result<Event<K>, watcher::Error>> + Send + 'static,
    {
        let (store, writer) = reflector::store();
        Self {
            store,
            events: events.reflect(writer).boxed(),
        }
    }
}

/// Readers for the three reflected kinds
#[derive(Clone)]
pub struct Stores {
    pub services: Store<Service>,
    pub pods: Store<Pod>,
    pub nodes: Store<Node>,
}

/// Reflected watches for Services, Pods and Nodes
pub struct Watches {
    pub services: Reflected<Service>,
    pub pods: Reflected<Pod>,
    pub nodes: Reflected<Node>,
}

impl Watches {
    /// Cluster-wide watches through the API server
    ///
    /// Dropped watches are re-established with the watcher's default backoff
    /// and relisted before they resume.
    pub fn from_client(client: &Client) -> Self {
        Self {
            services: Reflected::new(watch_all::<Service>(client)),
            pods: Reflected::new(watch_all::<Pod>(client)),
            nodes: Reflected::new(watch_all::<Node>(client)),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            services: self.services.store.clone(),
            pods: self.pods.store.clone(),
            nodes: self.nodes.store.clone(),
        }
    }
}

fn watch_all<K>(client: &Client) -> impl Stream<Item = Result<Event<K>, watcher::Error>> + Send
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
    watcher::watcher(Api::<K>::all(client.clone()), config).default_backoff()
}

/// Turns watcher events into change events
///
/// Keeps the last version seen of every object, which is what gives an
/// update its old snapshot. A relist (`Init` .. `InitDone`) is diffed against
/// that state: unchanged objects produce nothing and objects missing from the
/// relist are reported as deleted.
pub struct ChangeTracker<K> {
    last_seen: HashMap<ObjectKey, K>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl<K> Default for ChangeTracker<K> {
    fn default() -> Self {
        Self {
            last_seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource> ChangeTracker<K> {
    pub fn apply(&mut self, event: Event<K>) -> Vec<ChangeEvent> {
        match event {
            Event::Apply(object) => self.upsert(object).into_iter().collect(),
            Event::Delete(object) => match object.object_key() {
                Ok(key) => {
                    self.last_seen.remove(&key);
                    vec![ChangeEvent::Deleted(object.into_object())]
                }
                Err(e) => {
                    warn!("Dropping {} delete: {}", K::KIND, e);
                    Vec::new()
                }
            },
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(object) => {
                if let (Some(seen), Ok(key)) = (self.relisted.as_mut(), object.object_key()) {
                    seen.insert(key);
                }
                self.upsert(object).into_iter().collect()
            }
            Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let vanished: Vec<ObjectKey> = self
                    .last_seen
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                vanished
                    .into_iter()
                    .filter_map(|key| self.last_seen.remove(&key))
                    .map(|old| ChangeEvent::Deleted(old.into_object()))
                    .collect()
            }
        }
    }

    fn upsert(&mut self, object: K) -> Option<ChangeEvent> {
        let key = match object.object_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping {} event: {}", K::KIND, e);
                return None;
            }
        };

        match self.last_seen.insert(key, object.clone()) {
            Some(old) if old == object => None,
            Some(old) => Some(ChangeEvent::Updated {
                old: old.into_object(),
                new: object.into_object(),
            }),
            None => Some(ChangeEvent::Created(object.into_object())),
        }
    }
}

/// The objects of `events` whose change passes the relevance filter
///
/// Deletions yield the last known object. Watch errors pass through
/// unchanged.
pub fn admitted<K: Resource>(
    events: EventStream<K>,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send + 'static {
    let mut tracker = ChangeTracker::<K>::default();
    events.flat_map(move |event| {
        let items: Vec<Result<K, watcher::Error>> = match event {
            Ok(event) => tracker
                .apply(event)
                .into_iter()
                .filter(|change| {
                    let admit = filter::admits(change);
                    if !admit {
                        trace!(
                            action = change.action(),
                            kind = change.object().kind_name(),
                            "Dropping irrelevant change"
                        );
                    }
                    admit
                })
                .filter_map(|change| K::from_object(change.into_object()))
                .map(Ok)
                .collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnslb_core::{Object, StringMap};
    use k8s_openapi::api::core::v1::{PodStatus, ServiceSpec};
    use kube::runtime::reflector::ObjectRef;

    fn labels(pairs: &[(&str, &str)]) -> StringMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn service(name: &str, type_: &str) -> Service {
        let mut svc = Service::default();
        svc.metadata.name = Some(name.to_string());
        svc.metadata.namespace = Some("ns".to_string());
        svc.spec = Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(labels(&[("app", name)])),
            ..Default::default()
        });
        svc
    }

    fn pod(name: &str, phase: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("ns".to_string());
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        pod
    }

    fn events<K: Send + 'static>(events: Vec<Event<K>>) -> EventStream<K> {
        stream::iter(events.into_iter().map(Ok)).boxed()
    }

    #[test]
    fn test_apply_tracks_old_snapshot() {
        let mut tracker = ChangeTracker::default();

        let created = tracker.apply(Event::Apply(pod("p1", "Pending")));
        assert_eq!(created, vec![ChangeEvent::Created(Object::Pod(pod("p1", "Pending")))]);

        let updated = tracker.apply(Event::Apply(pod("p1", "Running")));
        assert_eq!(
            updated,
            vec![ChangeEvent::Updated {
                old: Object::Pod(pod("p1", "Pending")),
                new: Object::Pod(pod("p1", "Running")),
            }]
        );

        let deleted = tracker.apply(Event::Delete(pod("p1", "Running")));
        assert_eq!(deleted, vec![ChangeEvent::Deleted(Object::Pod(pod("p1", "Running")))]);
    }

    #[test]
    fn test_relist_reports_only_differences() {
        let mut tracker = ChangeTracker::default();
        tracker.apply(Event::Apply(pod("p1", "Running")));
        tracker.apply(Event::Apply(pod("p2", "Running")));
        tracker.apply(Event::Apply(pod("p3", "Pending")));

        assert!(tracker.apply(Event::Init).is_empty());
        assert!(tracker.apply(Event::InitApply(pod("p1", "Running"))).is_empty());
        let changed = tracker.apply(Event::InitApply(pod("p3", "Running")));
        assert!(matches!(changed.as_slice(), [ChangeEvent::Updated { .. }]));

        let done = tracker.apply(Event::InitDone);
        assert_eq!(done, vec![ChangeEvent::Deleted(Object::Pod(pod("p2", "Running")))]);
    }

    #[test]
    fn test_first_listing_creates_everything() {
        let mut tracker = ChangeTracker::default();
        tracker.apply(Event::Init);
        let created = tracker.apply(Event::InitApply(service("web", "LoadBalancer")));
        assert!(matches!(created.as_slice(), [ChangeEvent::Created(_)]));
        assert!(tracker.apply(Event::InitDone).is_empty());
    }

    #[test]
    fn test_nameless_object_is_dropped() {
        let mut tracker = ChangeTracker::<Pod>::default();
        assert!(tracker.apply(Event::Apply(Pod::default())).is_empty());
        assert!(tracker.apply(Event::Delete(Pod::default())).is_empty());
    }

    #[tokio::test]
    async fn test_admitted_applies_relevance_filter() {
        let mut lb_with_status = service("web", "LoadBalancer");
        lb_with_status.metadata.resource_version = Some("7".to_string());

        let admitted: Vec<Service> = admitted(events(vec![
            Event::Init,
            Event::InitApply(service("web", "LoadBalancer")),
            Event::InitApply(service("internal", "ClusterIP")),
            Event::InitDone,
            // Only metadata changed
            Event::Apply(lb_with_status),
            Event::Apply(service("web", "ClusterIP")),
            Event::Delete(service("internal", "ClusterIP")),
        ]))
        .map(|item| item.unwrap())
        .collect()
        .await;

        assert_eq!(
            admitted,
            vec![service("web", "LoadBalancer"), service("web", "ClusterIP")]
        );
    }

    #[tokio::test]
    async fn test_reflected_store_follows_stream() {
        let reflected = Reflected::new(events(vec![
            Event::Init,
            Event::InitApply(service("web", "LoadBalancer")),
            Event::InitDone,
            Event::Apply(service("web", "NodePort")),
        ]));
        let store = reflected.store.clone();
        assert!(store.is_empty());

        let seen = reflected.events.count().await;
        assert_eq!(seen, 4);
        store.wait_until_ready().await.unwrap();

        let stored = store.get(&ObjectRef::new("web").within("ns")).unwrap();
        assert_eq!(stored.spec.as_ref().unwrap().type_.as_deref(), Some("NodePort"));
    }
}
