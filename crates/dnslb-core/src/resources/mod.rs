pub mod selector;

pub use selector::{format_selector, maps_equal, selector_matches, StringMap};

use crate::{DnslbError, ObjectKey, ResourceKind, Result};
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Node annotation whose non-empty value replaces the node's advertised IP
pub const NODE_ADDRESS_ANNOTATION: &str = "dnslb.loadworks.com/address";

/// `spec.type` of Services that request externally reachable addresses
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// `spec.type` the platform assumes when none is declared
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";

/// `status.phase` of pods that are serving
pub const POD_PHASE_RUNNING: &str = "Running";

/// Trait for the core/v1 objects the controller reads
pub trait Resource:
    Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
    /// Kind of this resource
    const KIND: ResourceKind;

    /// Get the metadata of this resource
    fn metadata(&self) -> &ObjectMeta;

    /// Wrap this resource in the closed object union
    fn into_object(self) -> Object;

    /// Unwrap this kind from the closed object union
    fn from_object(object: Object) -> Option<Self>;

    /// Get the ObjectKey
    fn object_key(&self) -> Result<ObjectKey> {
        let metadata = self.metadata();
        let name = metadata
            .name
            .as_ref()
            .ok_or_else(|| DnslbError::missing_field(Self::KIND.as_str(), "metadata.name"))?;
        let namespace = if Self::KIND.is_namespaced() {
            metadata.namespace.clone().unwrap_or_default()
        } else {
            String::new()
        };

        Ok(ObjectKey::new(namespace, name))
    }

    /// Name for log lines, never fails
    fn display_name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or("<unknown>")
    }
}

impl Resource for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn into_object(self) -> Object {
        Object::Service(self)
    }

    fn from_object(object: Object) -> Option<Self> {
        match object {
            Object::Service(obj) => Some(obj),
            _ => None,
        }
    }
}

impl Resource for Pod {
    const KIND: ResourceKind = ResourceKind::Pod;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn into_object(self) -> Object {
        Object::Pod(self)
    }

    fn from_object(object: Object) -> Option<Self> {
        match object {
            Object::Pod(obj) => Some(obj),
            _ => None,
        }
    }
}

impl Resource for Node {
    const KIND: ResourceKind = ResourceKind::Node;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn into_object(self) -> Object {
        Object::Node(self)
    }

    fn from_object(object: Object) -> Option<Self> {
        match object {
            Object::Node(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Closed union over everything a watch can deliver
///
/// Filters and mappers match on this exhaustively; `Other` carries kinds the
/// controller does not understand and always falls into the default arms.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Service(Service),
    Pod(Pod),
    Node(Node),
    Other { kind: String, key: ObjectKey },
}

impl Object {
    /// Kind name, including unrecognised kinds
    pub fn kind_name(&self) -> &str {
        match self {
            Object::Service(_) => ResourceKind::Service.as_str(),
            Object::Pod(_) => ResourceKind::Pod.as_str(),
            Object::Node(_) => ResourceKind::Node.as_str(),
            Object::Other { kind, .. } => kind,
        }
    }

    /// Known kind, if any
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            Object::Service(_) => Some(ResourceKind::Service),
            Object::Pod(_) => Some(ResourceKind::Pod),
            Object::Node(_) => Some(ResourceKind::Node),
            Object::Other { .. } => None,
        }
    }

    pub fn object_key(&self) -> Result<ObjectKey> {
        match self {
            Object::Service(svc) => svc.object_key(),
            Object::Pod(pod) => pod.object_key(),
            Object::Node(node) => node.object_key(),
            Object::Other { key, .. } => Ok(key.clone()),
        }
    }
}

/// Declared `spec.type`, defaulting to ClusterIP
pub fn service_type(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or(SERVICE_TYPE_CLUSTER_IP)
}

pub fn is_load_balancer(service: &Service) -> bool {
    service_type(service) == SERVICE_TYPE_LOAD_BALANCER
}

pub fn service_selector(service: &Service) -> Option<&StringMap> {
    service.spec.as_ref().and_then(|s| s.selector.as_ref())
}

/// Ingress IPs currently recorded in the Service's status
pub fn ingress_addresses(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|i| i.ip.clone()).collect())
        .unwrap_or_default()
}

/// `status.phase`, or the empty string when the pod has not reported one
pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("")
}

pub fn is_running(pod: &Pod) -> bool {
    pod_phase(pod) == POD_PHASE_RUNNING
}

pub fn pod_labels(pod: &Pod) -> Option<&StringMap> {
    pod.metadata.labels.as_ref()
}

/// Node assignment, if the pod has been scheduled
pub fn pod_node_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
}

pub fn pod_host_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.host_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// Value of the address override annotation, if set and non-empty
pub fn node_address_override(node: &Node) -> Option<&str> {
    node.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(NODE_ADDRESS_ANNOTATION))
        .map(String::as_str)
        .filter(|addr| !addr.is_empty())
}
