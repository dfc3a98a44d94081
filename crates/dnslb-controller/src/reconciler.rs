use crate::context::Deadline;
use crate::error::Result;
use crate::fields::FieldSelector;
use crate::traits::{ClusterClient, ListParams};
use dnslb_core::resources::{
    format_selector, is_load_balancer, node_address_override, pod_host_ip, pod_node_name,
    service_selector, service_type, POD_PHASE_RUNNING,
};
use dnslb_core::{Node, Pod, ReconcileRequest, Service};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, Instrument, Span};

/// Result of one reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The service no longer exists
    ServiceGone,
    /// The ingress list was written
    Updated { addresses: Vec<String> },
}

/// Computes and persists the ingress addresses of one service
///
/// Every call re-reads the service, its pods and the node list; nothing is
/// carried over between calls and nothing is retried here.
pub struct Reconciler {
    client: Arc<dyn ClusterClient>,
    span: Span,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ClusterClient>, span: Span) -> Self {
        Self { client, span }
    }

    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        deadline: &Deadline,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_inner(request, deadline)
            .instrument(self.span.clone())
            .await
    }

    async fn reconcile_inner(
        &self,
        request: &ReconcileRequest,
        deadline: &Deadline,
    ) -> Result<ReconcileOutcome> {
        let service = deadline
            .run(
                "get service",
                self.client.get_service(&request.namespace, &request.name),
            )
            .await?;
        let Some(mut service) = service else {
            debug!(service = %request, "Service is gone, nothing to reconcile");
            return Ok(ReconcileOutcome::ServiceGone);
        };

        info!(
            service = %request,
            service_type = service_type(&service),
            selector = %service_selector(&service).map(format_selector).unwrap_or_default(),
            "reconciling service"
        );

        let addresses = if is_load_balancer(&service) {
            self.compute_addresses(&service, deadline).await?
        } else {
            Vec::new()
        };

        set_ingress(&mut service, &addresses);
        info!(service = %request, ingress = ?addresses, "updating service");
        deadline
            .run(
                "update service status",
                self.client.update_service_status(&service),
            )
            .await?;

        Ok(ReconcileOutcome::Updated { addresses })
    }

    /// Addresses of the nodes running the service's pods, in node list order
    async fn compute_addresses(&self, service: &Service, deadline: &Deadline) -> Result<Vec<String>> {
        let selector = match service_selector(service) {
            Some(selector) if !selector.is_empty() => selector.clone(),
            _ => return Ok(Vec::new()),
        };

        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let params = ListParams::in_namespace(namespace)
            .labels(selector)
            .fields(FieldSelector::pod_phase(POD_PHASE_RUNNING));
        let pods = deadline
            .run("list pods", self.client.list_pods(&params))
            .await?;
        let host_ips = host_ips_by_node(pods.iter().filter(|pod| params.matches(*pod)));

        let nodes = deadline
            .run("list nodes", self.client.list_nodes(&ListParams::default()))
            .await?;

        Ok(advertised_addresses(&nodes, &host_ips))
    }
}

/// Node name to host IP for every pod with a node assignment
///
/// Pods sharing a node collapse into one entry; the last non-empty host IP
/// wins. A node enters the map even when none of its pods reports a host IP,
/// so an address override on that node is still published.
fn host_ips_by_node<'a>(pods: impl Iterator<Item = &'a Pod>) -> HashMap<String, String> {
    let mut host_ips: HashMap<String, String> = HashMap::new();
    for pod in pods {
        let Some(node) = pod_node_name(pod) else {
            continue;
        };
        let entry = host_ips.entry(node.to_string()).or_default();
        if let Some(ip) = pod_host_ip(pod) {
            *entry = ip.to_string();
        }
    }
    host_ips
}

/// One address per mapped node, override first, skipping empty results
fn advertised_addresses(nodes: &[Node], host_ips: &HashMap<String, String>) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| {
            let host_ip = host_ips.get(node.metadata.name.as_deref()?)?;
            let address = node_address_override(node).unwrap_or(host_ip);
            (!address.is_empty()).then(|| address.to_string())
        })
        .collect()
}

/// Replace `status.loadBalancer` wholesale, keeping the rest of the status
fn set_ingress(service: &mut Service, addresses: &[String]) {
    let ingress = addresses
        .iter()
        .map(|ip| LoadBalancerIngress {
            ip: Some(ip.clone()),
            ..Default::default()
        })
        .collect();

    service.status.get_or_insert_with(Default::default).load_balancer = Some(LoadBalancerStatus {
        ingress: Some(ingress),
    });
}
