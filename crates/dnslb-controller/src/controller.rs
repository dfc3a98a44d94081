use crate::context::Deadline;
use crate::error::{ControllerError, Result};
use crate::mapper::{NodeMapper, PodMapper};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::traits::ClusterClient;
use crate::watch::{admitted, Watches};
use dnslb_core::resources::is_load_balancer;
use dnslb_core::{ReconcileRequest, Resource, Service};
use futures_util::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::Controller;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Configuration for the service controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval of forced resyncs of every LoadBalancer service (zero disables)
    pub resync_interval: Duration,
    /// Number of reconciles allowed to run at once
    pub workers: u16,
    /// Deadline for one reconcile
    pub reconcile_timeout: Duration,
    /// Pause before a failed reconcile is retried
    pub retry_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::ZERO,
            workers: 4,
            reconcile_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Default configuration with a resync interval in whole seconds
    pub fn with_sync_seconds(seconds: u64) -> Self {
        Self {
            resync_interval: Duration::from_secs(seconds),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ControllerError::invalid_config(
                "worker count must be at least 1",
                "Pass --workers 1 or higher",
            ));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(ControllerError::invalid_config(
                "reconcile timeout must be positive",
                "Pass --reconcile-timeout 1 or higher",
            ));
        }
        if self.retry_delay.is_zero() {
            return Err(ControllerError::invalid_config(
                "retry delay must be positive",
                "Pass --retry-delay 1 or higher",
            ));
        }
        Ok(())
    }

    /// What to do with a service after a successful reconcile
    fn after_success(&self, service: &Service) -> Action {
        if self.resync_interval.is_zero() || !is_load_balancer(service) {
            Action::await_change()
        } else {
            Action::requeue(self.resync_interval)
        }
    }
}

/// Shared state handed to every reconcile
pub struct Context {
    reconciler: Reconciler,
    config: ControllerConfig,
    token: CancellationToken,
}

impl Context {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: ControllerConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(client, info_span!("reconciler")),
            config,
            token,
        }
    }
}

/// Reconcile one service under a fresh deadline
pub async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action> {
    let request = ReconcileRequest::from(service.object_key()?);
    let deadline = Deadline::after(ctx.config.reconcile_timeout, ctx.token.child_token());

    match ctx.reconciler.reconcile(&request, &deadline).await? {
        ReconcileOutcome::Updated { addresses } => {
            debug!(service = %request, ingress = ?addresses, "Reconciled");
            Ok(ctx.config.after_success(&service))
        }
        ReconcileOutcome::ServiceGone => Ok(Action::await_change()),
    }
}

/// Retry transient failures after the configured delay
///
/// Terminal errors, and anything failing during shutdown, wait for the next
/// change instead.
pub fn error_policy(service: Arc<Service>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let namespace = service.metadata.namespace.as_deref().unwrap_or_default();
    if error.is_retryable() && !ctx.token.is_cancelled() {
        warn!(
            namespace,
            service = service.display_name(),
            retry_in = ?ctx.config.retry_delay,
            "Reconcile failed: {}",
            error
        );
        Action::requeue(ctx.config.retry_delay)
    } else {
        warn!(
            namespace,
            service = service.display_name(),
            "Reconcile failed, not retrying: {}",
            error
        );
        Action::await_change()
    }
}

fn object_ref(request: ReconcileRequest) -> ObjectRef<Service> {
    ObjectRef::new(&request.name).within(&request.namespace)
}

/// Watches Services, Pods and Nodes and keeps LoadBalancer ingress current
///
/// Each watch is reflected into its store and passed through the relevance
/// filter. Admitted services trigger their own reconcile; admitted pods and
/// nodes are fanned out to services by the mappers. The runtime controller
/// never runs two reconciles of one service at once.
pub struct ServiceController {
    client: Arc<dyn ClusterClient>,
    config: ControllerConfig,
    span: Span,
}

impl ServiceController {
    pub fn new(client: Arc<dyn ClusterClient>, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            span: info_span!("controller"),
        })
    }

    /// Run until `token` is cancelled
    ///
    /// In-flight reconciles are allowed to finish before this returns.
    pub async fn run(self, watches: Watches, token: CancellationToken) -> Result<()> {
        let span = self.span.clone();
        self.run_inner(watches, token).instrument(span).await
    }

    async fn run_inner(self, watches: Watches, token: CancellationToken) -> Result<()> {
        info!(
            workers = self.config.workers,
            resync_interval = ?self.config.resync_interval,
            "Starting service controller"
        );

        let Watches {
            services,
            pods,
            nodes,
        } = watches;
        let pod_mapper = PodMapper::new(services.store.clone(), info_span!("pod_mapper"));
        let node_mapper = NodeMapper::new(services.store.clone(), info_span!("node_mapper"));
        let config = controller::Config::default().concurrency(self.config.workers);
        let context = Arc::new(Context::new(self.client, self.config, token.clone()));

        Controller::for_stream(admitted(services.events), services.store)
            .with_config(config)
            .watches_stream(admitted(pods.events), move |pod| {
                pod_mapper
                    .map(&pod)
                    .into_iter()
                    .map(object_ref)
                    .collect::<Vec<_>>()
            })
            .watches_stream(admitted(nodes.events), move |node| {
                node_mapper
                    .map(&node)
                    .into_iter()
                    .map(object_ref)
                    .collect::<Vec<_>>()
            })
            .graceful_shutdown_on(token.cancelled_owned())
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((service, action)) => {
                        debug!(service = %service, ?action, "Reconcile finished")
                    }
                    // Already reported by the error policy
                    Err(controller::Error::ReconcilerFailed(_, service)) => {
                        debug!(service = %service, "Reconcile failed")
                    }
                    Err(e) => warn!("Service controller error: {}", e),
                }
            })
            .await;

        info!("Service controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCluster, MockOperation};
    use dnslb_core::StringMap;
    use k8s_openapi::api::core::v1::ServiceSpec;

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

    fn context(cluster: Arc<MockCluster>, config: ControllerConfig) -> Arc<Context> {
        Arc::new(Context::new(cluster, config, CancellationToken::new()))
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(30));
        assert!(config.resync_interval.is_zero());
        assert_eq!(
            ControllerConfig::with_sync_seconds(60).resync_interval,
            Duration::from_secs(60)
        );

        let config = ControllerConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ControllerError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_resync_requeues_only_load_balancers() {
        let cluster = Arc::new(MockCluster::new());
        cluster.apply_service(service("web", "LoadBalancer"));
        cluster.apply_service(service("db", "ClusterIP"));
        let ctx = context(cluster.clone(), ControllerConfig::with_sync_seconds(10));

        let action = reconcile(Arc::new(service("web", "LoadBalancer")), ctx.clone())
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));

        let action = reconcile(Arc::new(service("db", "ClusterIP")), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(cluster.status_updates().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_never_requeues() {
        let cluster = Arc::new(MockCluster::new());
        cluster.apply_service(service("web", "LoadBalancer"));
        let ctx = context(cluster, ControllerConfig::default());

        let action = reconcile(Arc::new(service("web", "LoadBalancer")), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_vanished_service_waits_for_change() {
        let cluster = Arc::new(MockCluster::new());
        let ctx = context(cluster.clone(), ControllerConfig::with_sync_seconds(10));

        let action = reconcile(Arc::new(service("web", "LoadBalancer")), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
        assert!(cluster.status_updates().is_empty());
    }

    #[tokio::test]
    async fn test_error_policy_retries_transient_failures() {
        let cluster = Arc::new(MockCluster::new());
        cluster.apply_service(service("web", "LoadBalancer"));
        cluster.fail_next(MockOperation::ListNodes);
        let config = ControllerConfig {
            retry_delay: Duration::from_secs(3),
            ..Default::default()
        };
        let ctx = context(cluster, config);
        let svc = Arc::new(service("web", "LoadBalancer"));

        let error = reconcile(svc.clone(), ctx.clone()).await.unwrap_err();
        assert_eq!(
            error_policy(svc.clone(), &error, ctx.clone()),
            Action::requeue(Duration::from_secs(3))
        );

        let terminal = ControllerError::service_not_found("ns/web");
        assert_eq!(error_policy(svc.clone(), &terminal, ctx.clone()), Action::await_change());

        ctx.token.cancel();
        assert_eq!(error_policy(svc, &error, ctx), Action::await_change());
    }
}
