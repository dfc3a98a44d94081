//! Relevance filter
//!
//! Decides which change events produce reconcile work. Everything here is a
//! pure function of the snapshots it is given.

use dnslb_core::resources::{
    is_load_balancer, is_running, maps_equal, node_address_override, pod_labels, pod_phase,
    service_selector, service_type,
};
use dnslb_core::{ChangeEvent, Node, Object, Pod, Service};

/// Whether a single snapshot (create, delete or generic event) matters
pub fn is_relevant(object: &Object) -> bool {
    match object {
        Object::Service(svc) => is_load_balancer(svc),
        Object::Pod(pod) => is_running(pod),
        Object::Node(node) => node_address_override(node).is_some(),
        Object::Other { .. } => false,
    }
}

/// Whether an update from `old` to `new` matters
///
/// Updates where neither side is relevant are dropped. Otherwise the per-kind
/// change filter decides; a kind mismatch or an unknown kind is admitted.
pub fn is_relevant_update(old: &Object, new: &Object) -> bool {
    if !is_relevant(old) && !is_relevant(new) {
        return false;
    }

    match (old, new) {
        (Object::Service(old), Object::Service(new)) => service_changed(old, new),
        (Object::Pod(old), Object::Pod(new)) => pod_changed(old, new),
        (Object::Node(old), Object::Node(new)) => node_changed(old, new),
        _ => true,
    }
}

/// Dispatch a change event to the matching predicate
pub fn admits(event: &ChangeEvent) -> bool {
    match event {
        ChangeEvent::Created(obj) | ChangeEvent::Deleted(obj) | ChangeEvent::Resynced(obj) => {
            is_relevant(obj)
        }
        ChangeEvent::Updated { old, new } => is_relevant_update(old, new),
    }
}

fn service_changed(old: &Service, new: &Service) -> bool {
    service_type(old) != service_type(new)
        || !maps_equal(service_selector(old), service_selector(new))
}

fn pod_changed(old: &Pod, new: &Pod) -> bool {
    pod_phase(old) != pod_phase(new) || !maps_equal(pod_labels(old), pod_labels(new))
}

fn node_changed(old: &Node, new: &Node) -> bool {
    node_address_override(old) != node_address_override(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnslb_core::{ObjectKey, StringMap, NODE_ADDRESS_ANNOTATION};
    use k8s_openapi::api::core::v1::{PodStatus, ServiceSpec};

    fn labels(pairs: &[(&str, &str)]) -> StringMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn service(type_: &str, selector: &[(&str, &str)]) -> Object {
        let mut svc = Service::default();
        svc.metadata.name = Some("web".to_string());
        svc.metadata.namespace = Some("ns".to_string());
        svc.spec = Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(labels(selector)),
            ..Default::default()
        });
        Object::Service(svc)
    }

    fn pod(phase: &str, pod_labels: &[(&str, &str)]) -> Object {
        let mut pod = Pod::default();
        pod.metadata.name = Some("p1".to_string());
        pod.metadata.namespace = Some("ns".to_string());
        pod.metadata.labels = Some(labels(pod_labels));
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        Object::Pod(pod)
    }

    fn node(address: Option<&str>) -> Object {
        let mut node = Node::default();
        node.metadata.name = Some("n1".to_string());
        node.metadata.annotations =
            address.map(|a| labels(&[(NODE_ADDRESS_ANNOTATION, a)]));
        Object::Node(node)
    }

    fn other() -> Object {
        Object::Other {
            kind: "ConfigMap".to_string(),
            key: ObjectKey::new("ns", "cm"),
        }
    }

    #[test]
    fn test_single_object_relevance() {
        assert!(is_relevant(&service("LoadBalancer", &[])));
        assert!(!is_relevant(&service("ClusterIP", &[])));
        assert!(is_relevant(&pod("Running", &[])));
        assert!(!is_relevant(&pod("Pending", &[])));
        assert!(is_relevant(&node(Some("203.0.113.5"))));
        assert!(!is_relevant(&node(Some(""))));
        assert!(!is_relevant(&node(None)));
        assert!(!is_relevant(&other()));
    }

    #[test]
    fn test_service_update_with_unrelated_change_is_dropped() {
        let old = service("LoadBalancer", &[("app", "web")]);
        let mut new = old.clone();
        if let Object::Service(svc) = &mut new {
            svc.metadata.labels = Some(labels(&[("team", "edge")]));
            svc.metadata.resource_version = Some("42".to_string());
        }
        assert!(!is_relevant_update(&old, &new));
    }

    #[test]
    fn test_service_update_type_or_selector_change() {
        let old = service("LoadBalancer", &[("app", "web")]);
        assert!(is_relevant_update(&old, &service("ClusterIP", &[("app", "web")])));
        assert!(is_relevant_update(&old, &service("LoadBalancer", &[("app", "api")])));
        assert!(is_relevant_update(
            &old,
            &service("LoadBalancer", &[("app", "web"), ("tier", "fe")])
        ));
    }

    #[test]
    fn test_update_between_irrelevant_snapshots_is_dropped() {
        assert!(!is_relevant_update(
            &service("ClusterIP", &[("app", "a")]),
            &service("NodePort", &[("app", "b")])
        ));
        assert!(!is_relevant_update(&pod("Pending", &[]), &pod("Failed", &[])));
    }

    #[test]
    fn test_pod_update_phase_or_labels() {
        assert!(is_relevant_update(&pod("Pending", &[]), &pod("Running", &[])));
        assert!(is_relevant_update(&pod("Running", &[]), &pod("Succeeded", &[])));
        assert!(is_relevant_update(
            &pod("Running", &[("app", "web")]),
            &pod("Running", &[("app", "api")])
        ));
        assert!(!is_relevant_update(
            &pod("Running", &[("app", "web")]),
            &pod("Running", &[("app", "web")])
        ));
    }

    #[test]
    fn test_node_update_override() {
        assert!(is_relevant_update(&node(Some("1.1.1.1")), &node(Some("2.2.2.2"))));
        assert!(is_relevant_update(&node(Some("1.1.1.1")), &node(None)));
        assert!(!is_relevant_update(&node(Some("1.1.1.1")), &node(Some("1.1.1.1"))));
    }

    #[test]
    fn test_mixed_kinds_fail_open() {
        assert!(is_relevant_update(&service("LoadBalancer", &[]), &pod("Pending", &[])));
        assert!(is_relevant_update(&other(), &pod("Running", &[])));
        assert!(!is_relevant_update(&other(), &other()));
    }

    #[test]
    fn test_admits_dispatches_on_event() {
        assert!(admits(&ChangeEvent::Created(service("LoadBalancer", &[]))));
        assert!(!admits(&ChangeEvent::Deleted(pod("Pending", &[]))));
        assert!(admits(&ChangeEvent::Resynced(service("LoadBalancer", &[]))));
        let svc = service("LoadBalancer", &[("app", "web")]);
        assert!(!admits(&ChangeEvent::Updated {
            old: svc.clone(),
            new: svc,
        }));
    }
}
