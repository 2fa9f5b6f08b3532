//! Ingress-backed router
//!
//! Each public operation is one request-triggered read-modify-write against
//! the cluster. Nothing is cached between calls and nothing is retried;
//! concurrent writers for the same application are arbitrated by the
//! store's resourceVersion checks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use tracing::{debug, info, instrument};

use crate::certificate::{CertData, CertificateManager};
use crate::cname::{AliasPlan, AliasSet, CNameManager};
use crate::config::{annotations, RouterConfig};
use crate::desired::{DesiredStateBuilder, RouteKind};
use crate::diff;
use crate::error::RouterError;
use crate::naming;
use crate::options::{self, BackendId};
use crate::resolver::{BackendResolver, BackendTarget, NamespaceResolver};
use crate::route;
use crate::router::{EnsureRequest, Router, RouterStatus, RouterTls};
use crate::status::{StatusProber, StatusReport};
use crate::store::{ClusterStore, KubeStore};
use crate::swap::{self, SwapCoordinator, SwapSide};

pub struct IngressService {
    config: Arc<RouterConfig>,
    store: Arc<dyn ClusterStore>,
    namespaces: NamespaceResolver,
    backends: BackendResolver,
    builder: DesiredStateBuilder,
    cnames: CNameManager,
    certificates: CertificateManager,
    swaps: SwapCoordinator,
    prober: StatusProber,
}

impl IngressService {
    pub fn new(store: Arc<dyn ClusterStore>, config: RouterConfig) -> Self {
        let config = Arc::new(config);
        let builder = DesiredStateBuilder::new(Arc::clone(&config));

        Self {
            namespaces: NamespaceResolver::new(
                Arc::clone(&store),
                config.namespace.clone(),
                config.registration_namespace(),
            ),
            backends: BackendResolver::new(Arc::clone(&store)),
            cnames: CNameManager::new(Arc::clone(&store), builder.clone()),
            certificates: CertificateManager::new(Arc::clone(&store)),
            swaps: SwapCoordinator::new(Arc::clone(&store)),
            prober: StatusProber::new(Arc::clone(&store)),
            builder,
            store,
            config,
        }
    }

    /// Router talking to the cluster through `client`
    pub fn with_client(client: Client, config: RouterConfig) -> Self {
        let store = KubeStore::new(client, config.timeout());
        Self::new(Arc::new(store), config)
    }
}

#[async_trait]
impl Router for IngressService {
    #[instrument(skip(self, request), fields(app = %id.app))]
    async fn ensure(&self, id: &BackendId, request: EnsureRequest) -> Result<(), RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        let service = self.backends.resolve(id, &namespace).await?;
        let target = BackendTarget::from_service(&service, request.opts.exposed_port)?;

        let existing =
            route::fetch(self.store.as_ref(), &namespace, &naming::route_name(id)).await?;
        let previous = existing
            .as_ref()
            .map(AliasSet::recorded_on)
            .unwrap_or_default();
        let plan = AliasPlan::new(&request.cnames, &previous, request.preserve_old_cnames);
        debug!(
            added = %plan.keep.additions(&previous).to_annotation(),
            removed = %plan.remove.to_annotation(),
            "Alias plan"
        );

        // Siblings first: the primary's alias annotation is the only record
        // of what to remove, so it must not move ahead of the siblings
        self.cnames
            .ensure(id, &namespace, &service, &target, &request.opts, &plan.keep)
            .await?;
        self.cnames.remove(id, &namespace, &plan.remove).await?;

        let mut desired = self.builder.build(
            id,
            &namespace,
            &service,
            &target,
            &request.opts,
            RouteKind::Primary,
        );
        desired
            .annotations
            .insert(annotations::ALIASES.to_string(), plan.keep.to_annotation());
        desired.removed_annotations.remove(annotations::ALIASES);

        let (_, outcome) = diff::apply(self.store.as_ref(), existing, desired).await?;

        info!(
            ?outcome,
            service = %target.service,
            port = target.port,
            aliases = plan.keep.len(),
            removed_aliases = plan.remove.len(),
            "Backend ensured"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(app = %id.app))]
    async fn remove(&self, id: &BackendId) -> Result<(), RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        let name = naming::route_name(id);

        let Some(primary) = route::fetch(self.store.as_ref(), &namespace, &name).await? else {
            info!("Route object already absent");
            return Ok(());
        };
        swap::ensure_not_swapped(&id.app, &primary)?;

        self.cnames
            .remove(id, &namespace, &AliasSet::recorded_on(&primary))
            .await?;
        match self.store.delete_ingress(&namespace, &name).await {
            Ok(()) => info!("Backend removed"),
            Err(e) if e.is_not_found() => info!("Route object already absent"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn get_addresses(&self, id: &BackendId) -> Result<Vec<String>, RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        let primary =
            route::fetch(self.store.as_ref(), &namespace, &naming::route_name(id)).await?;

        Ok(primary
            .as_ref()
            .and_then(route::primary_host)
            .map(|host| vec![host.to_string()])
            .unwrap_or_default())
    }

    #[instrument(skip(self, src, dst), fields(src = %src.app, dst = %dst.app))]
    async fn swap(&self, src: &BackendId, dst: &BackendId) -> Result<(), RouterError> {
        let src_namespace = self.namespaces.resolve(&src.app).await?;
        let dst_namespace = self.namespaces.resolve(&dst.app).await?;

        self.swaps
            .swap(
                SwapSide {
                    id: src,
                    namespace: &src_namespace,
                },
                SwapSide {
                    id: dst,
                    namespace: &dst_namespace,
                },
            )
            .await
    }

    fn supported_options(&self) -> BTreeMap<String, String> {
        options::supported_options(&self.config)
    }

    fn tls(&self) -> Option<&dyn RouterTls> {
        Some(self)
    }

    fn status(&self) -> Option<&dyn RouterStatus> {
        Some(self)
    }
}

#[async_trait]
impl RouterTls for IngressService {
    async fn add_certificate(
        &self,
        id: &BackendId,
        host: &str,
        cert: CertData,
    ) -> Result<(), RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        self.certificates.add(id, &namespace, host, cert).await
    }

    async fn get_certificate(&self, id: &BackendId, host: &str) -> Result<CertData, RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        self.certificates.get(id, &namespace, host).await
    }

    async fn remove_certificate(&self, id: &BackendId, host: &str) -> Result<(), RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        self.certificates.remove(id, &namespace, host).await
    }
}

#[async_trait]
impl RouterStatus for IngressService {
    async fn get_backend_status(&self, id: &BackendId) -> Result<StatusReport, RouterError> {
        let namespace = self.namespaces.resolve(&id.app).await?;
        self.prober.probe(id, &namespace).await
    }
}
