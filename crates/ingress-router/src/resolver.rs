//! Namespace and backend service resolution
//!
//! Maps an application to the namespace its resources live in, then picks
//! the service that receives user-facing traffic:
//! 1. Exactly one (non-headless) service labelled with the app wins
//! 2. With several, exactly one must carry the requested process label
//!    (`web` unless the backend id names another process)

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{IngressBackend, IngressServiceBackend, ServiceBackendPort};
use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::config::labels;
use crate::error::RouterError;
use crate::options::BackendId;
use crate::store::ClusterStore;

/// Resolved pointer a route object's backend must reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendTarget {
    pub service: String,
    pub namespace: String,
    pub port: i32,
}

impl BackendTarget {
    /// Pick the routed port of `service`: the exposed one when requested,
    /// otherwise the first declared port
    pub fn from_service(service: &Service, exposed_port: Option<u16>) -> Result<Self, RouterError> {
        let name = service.name_any();
        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .filter(|ports| !ports.is_empty())
            .ok_or_else(|| RouterError::ServiceWithoutPorts {
                service: name.clone(),
            })?;

        let port = match exposed_port {
            Some(wanted) => ports
                .iter()
                .find(|p| p.port == i32::from(wanted))
                .map(|p| p.port)
                .ok_or(RouterError::ExposedPortNotDeclared {
                    service: name.clone(),
                    port: wanted,
                })?,
            None => ports[0].port,
        };

        Ok(Self {
            service: name,
            namespace: service.namespace().unwrap_or_default(),
            port,
        })
    }

    pub fn to_ingress_backend(&self) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: self.service.clone(),
                port: Some(ServiceBackendPort {
                    number: Some(self.port),
                    name: None,
                }),
            }),
            resource: None,
        }
    }
}

/// Resolves the namespace of an application
pub struct NamespaceResolver {
    store: Arc<dyn ClusterStore>,
    default_namespace: String,
    registration_namespace: String,
}

impl NamespaceResolver {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        default_namespace: impl Into<String>,
        registration_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            default_namespace: default_namespace.into(),
            registration_namespace: registration_namespace.into(),
        }
    }

    /// Namespace from the app's registration record, or the default one
    #[instrument(skip(self))]
    pub async fn resolve(&self, app: &str) -> Result<String, RouterError> {
        match self.store.get_app(&self.registration_namespace, app).await {
            Ok(record) => match record.spec.namespace_name.filter(|ns| !ns.is_empty()) {
                Some(namespace) => {
                    debug!(namespace = %namespace, "Namespace from app registration");
                    Ok(namespace)
                }
                None => Ok(self.default_namespace.clone()),
            },
            Err(e) if e.is_not_found() => Ok(self.default_namespace.clone()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Selects the backend service of an application
pub struct BackendResolver {
    store: Arc<dyn ClusterStore>,
}

impl BackendResolver {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(app = %id.app))]
    pub async fn resolve(&self, id: &BackendId, namespace: &str) -> Result<Service, RouterError> {
        let selector = format!("{}={}", labels::APP, id.app);
        let services = self.store.list_services(namespace, &selector).await?;
        let process = id.process.as_deref().unwrap_or(labels::WEB_PROCESS);
        let selected = select_service(services, process).map_err(|with_process| {
            RouterError::NoBackendService {
                app: id.app.clone(),
                process: with_process.then(|| process.to_string()),
            }
        })?;
        debug!(service = %selected.name_any(), "Selected backend service");
        Ok(selected)
    }
}

fn is_headless(service: &Service) -> bool {
    service
        .labels()
        .get(labels::HEADLESS)
        .is_some_and(|v| v == "true")
}

/// Apply the selection rule. On failure, reports whether the failure was
/// process-specific (several candidates, none or many for the process).
fn select_service(services: Vec<Service>, process: &str) -> Result<Service, bool> {
    let mut candidates: Vec<Service> = services.into_iter().filter(|s| !is_headless(s)).collect();

    match candidates.len() {
        0 => Err(false),
        1 => Ok(candidates.remove(0)),
        _ => {
            let mut matching: Vec<Service> = candidates
                .into_iter()
                .filter(|s| s.labels().get(labels::PROCESS).is_some_and(|p| p == process))
                .collect();
            if matching.len() == 1 {
                Ok(matching.remove(0))
            } else {
                Err(true)
            }
        }
    }
}
