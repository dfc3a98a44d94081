use crate::error::Result;
use crate::fields::{FieldSelector, Indexable};
use async_trait::async_trait;
use dnslb_core::resources::selector_matches;
use dnslb_core::{Node, Pod, Service, StringMap};

/// Filters accepted by the list operations
///
/// Callers that depend on a predicate re-check results with
/// [`ListParams::matches`], so a backend that ignores one only costs
/// performance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub namespace: Option<String>,
    pub label_selector: Option<StringMap>,
    pub field_selector: Option<FieldSelector>,
}

impl ListParams {
    /// Restrict the list to one namespace
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn labels(mut self, selector: StringMap) -> Self {
        self.label_selector = Some(selector);
        self
    }

    pub fn fields(mut self, selector: FieldSelector) -> Self {
        self.field_selector = Some(selector);
        self
    }

    /// Evaluate all three filters against one object
    pub fn matches<R: Indexable>(&self, object: &R) -> bool {
        if let Some(namespace) = &self.namespace {
            if R::KIND.is_namespaced()
                && object.metadata().namespace.as_deref().unwrap_or_default() != namespace.as_str()
            {
                return false;
            }
        }

        if let Some(selector) = &self.label_selector {
            if !selector_matches(selector, object.metadata().labels.as_ref()) {
                return false;
            }
        }

        match &self.field_selector {
            Some(field) => field.matches(object),
            None => true,
        }
    }
}

/// The platform operations dnslb consumes
///
/// `KubeClient` reads from the watch-fed reflector stores and writes to the
/// API server; `MockCluster` keeps everything in memory.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch one Service; `Ok(None)` when it does not exist
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// List Pods, in platform order
    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>>;

    /// List Nodes, in platform order
    async fn list_nodes(&self, params: &ListParams) -> Result<Vec<Node>>;

    /// Replace the status of a Service
    async fn update_service_status(&self, service: &Service) -> Result<Service>;
}
