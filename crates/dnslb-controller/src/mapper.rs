use crate::fields::FieldSelector;
use crate::traits::ListParams;
use dnslb_core::resources::{
    is_load_balancer, pod_labels, selector_matches, service_selector, SERVICE_TYPE_LOAD_BALANCER,
};
use dnslb_core::{Node, Pod, ReconcileRequest, Resource, Service};
use kube::runtime::reflector::Store;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, Span};

/// Fans a pod change out to the LoadBalancer services selecting it
#[derive(Clone)]
pub struct PodMapper {
    services: Store<Service>,
    span: Span,
}

impl PodMapper {
    pub fn new(services: Store<Service>, span: Span) -> Self {
        Self { services, span }
    }

    /// Requests for every LoadBalancer service in the pod's namespace whose
    /// non-empty selector matches the pod's labels
    pub fn map(&self, pod: &Pod) -> Vec<ReconcileRequest> {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        debug!(parent: &self.span, pod = %pod.display_name(), namespace = %namespace, "pod watch");

        let params = ListParams::in_namespace(namespace)
            .fields(FieldSelector::service_type(SERVICE_TYPE_LOAD_BALANCER));
        let labels = pod_labels(pod);
        let services = self.services.state();
        let selected = services.iter().filter(|svc| {
            params.matches(svc.as_ref())
                && service_selector(svc)
                    .filter(|selector| !selector.is_empty())
                    .is_some_and(|selector| selector_matches(selector, labels))
        });

        requests_for(selected)
    }
}

/// Fans a node change out to every LoadBalancer service in the cluster
#[derive(Clone)]
pub struct NodeMapper {
    services: Store<Service>,
    span: Span,
}

impl NodeMapper {
    pub fn new(services: Store<Service>, span: Span) -> Self {
        Self { services, span }
    }

    pub fn map(&self, node: &Node) -> Vec<ReconcileRequest> {
        debug!(parent: &self.span, node = %node.display_name(), "node watch");

        let services = self.services.state();
        requests_for(services.iter().filter(|svc| is_load_balancer(svc)))
    }
}

/// One request per distinct service, ordered by namespace and name
fn requests_for<'a>(services: impl Iterator<Item = &'a Arc<Service>>) -> Vec<ReconcileRequest> {
    services
        .filter_map(|svc| svc.object_key().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(ReconcileRequest::from)
        .collect()
}
