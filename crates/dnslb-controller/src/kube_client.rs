use crate::error::{ControllerError, Result};
use crate::fields::Indexable;
use crate::traits::{ClusterClient, ListParams};
use crate::watch::Stores;
use async_trait::async_trait;
use dnslb_core::{Node, ObjectKey, Pod, Resource, ResourceKind, Service};
use kube::api::PostParams;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client};
use tracing::debug;

/// `ClusterClient` over the API server
///
/// Reads are answered from the reflector stores fed by the controller's
/// watches and wait until the first listing of the kind has completed. Status
/// writes go to the API server; the stores only ever change through their
/// watch, so a write never replaces a newer object the watch already
/// delivered.
pub struct KubeClient {
    client: Client,
    stores: Stores,
}

impl KubeClient {
    pub fn new(client: Client, stores: Stores) -> Self {
        Self { client, stores }
    }
}

async fn ready<K>(store: &Store<K>, kind: ResourceKind) -> Result<()>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    store
        .wait_until_ready()
        .await
        .map_err(|e| ControllerError::watch_closed(kind.as_str(), e.to_string()))
}

/// Matching objects in platform list order (namespace, then name)
fn list_from<K>(store: &Store<K>, params: &ListParams) -> Vec<K>
where
    K: kube::Resource<DynamicType = ()> + Indexable,
{
    let mut objects: Vec<(ObjectKey, K)> = store
        .state()
        .into_iter()
        .filter(|obj| params.matches(obj.as_ref()))
        .filter_map(|obj| Some((obj.object_key().ok()?, K::clone(&obj))))
        .collect();
    objects.sort_by(|(a, _), (b, _)| a.cmp(b));
    objects.into_iter().map(|(_, obj)| obj).collect()
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        ready(&self.stores.services, ResourceKind::Service).await?;
        let service = self
            .stores
            .services
            .get(&ObjectRef::new(name).within(namespace));
        Ok(service.map(|svc| Service::clone(&svc)))
    }

    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>> {
        ready(&self.stores.pods, ResourceKind::Pod).await?;
        Ok(list_from(&self.stores.pods, params))
    }

    async fn list_nodes(&self, params: &ListParams) -> Result<Vec<Node>> {
        ready(&self.stores.nodes, ResourceKind::Node).await?;
        Ok(list_from(&self.stores.nodes, params))
    }

    /// Replace the status subresource, guarded by the object's resourceVersion
    async fn update_service_status(&self, service: &Service) -> Result<Service> {
        let key = service.object_key()?;
        let body = dnslb_core::to_json(service)?;

        let api: Api<Service> = Api::namespaced(self.client.clone(), &key.namespace);
        let updated = api
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| match e {
                kube::Error::Api(response) if response.code == 404 => {
                    ControllerError::service_not_found(key.to_string())
                }
                e => ControllerError::api_error("update service status", e.to_string()),
            })?;

        debug!(
            service = %key,
            resource_version = updated.metadata.resource_version.as_deref().unwrap_or_default(),
            "Status written"
        );
        Ok(updated)
    }
}
