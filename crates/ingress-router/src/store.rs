//! Cluster resource store
//!
//! Typed access to the four object kinds the router manages or reads:
//! backend Services, Ingress route objects, TLS Secrets and App
//! registration records. Results are never cached between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::app::App;

/// Trait for cluster store operations
///
/// This trait allows for mocking in tests while keeping the concrete
/// implementation for production use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// List services in a namespace matching a label selector
    async fn list_services(&self, namespace: &str, selector: &str)
        -> Result<Vec<Service>, StoreError>;

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError>;

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress)
        -> Result<Ingress, StoreError>;

    /// Replace an ingress; fails with `Conflict` when its resourceVersion is stale
    async fn replace_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError>;

    /// Delete an ingress and, in the foreground, its dependents
    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Fetch an application registration record
    async fn get_app(&self, namespace: &str, name: &str) -> Result<App, StoreError>;

    /// List events whose involved object has the given UID
    async fn list_events(&self, namespace: &str, uid: &str) -> Result<Vec<Event>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: &'static str, name: String },
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    fn from_kube(kind: &'static str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref ae) if ae.code == 404 => StoreError::NotFound {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(ref ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists {
                    kind,
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ref ae) if ae.code == 409 => StoreError::Conflict {
                kind,
                name: name.to_string(),
            },
            other => StoreError::Kube(other),
        }
    }
}

/// Store backed by the Kubernetes API
///
/// The client is injected by the caller; nothing here discovers
/// credentials on its own.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        kind: &'static str,
        name: &str,
        request: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| StoreError::from_kube(kind, name, e)),
            Err(_) => Err(StoreError::Timeout { operation }),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    #[instrument(skip(self))]
    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, StoreError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(selector);
        let list = self
            .call("list_services", "Service", selector, api.list(&params))
            .await?;
        debug!(count = list.items.len(), "Listed services");
        Ok(list.items)
    }

    #[instrument(skip(self))]
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        self.call("get_ingress", "Ingress", name, api.get(name)).await
    }

    #[instrument(skip(self, ingress), fields(name = %ingress.name_any()))]
    async fn create_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let name = ingress.name_any();
        let created = self
            .call(
                "create_ingress",
                "Ingress",
                &name,
                api.create(&PostParams::default(), ingress),
            )
            .await?;
        debug!("Created ingress");
        Ok(created)
    }

    #[instrument(skip(self, ingress), fields(name = %ingress.name_any()))]
    async fn replace_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let name = ingress.name_any();
        let replaced = self
            .call(
                "replace_ingress",
                "Ingress",
                &name,
                api.replace(&name, &PostParams::default(), ingress),
            )
            .await?;
        debug!(
            resource_version = ?replaced.metadata.resource_version,
            "Replaced ingress"
        );
        Ok(replaced)
    }

    #[instrument(skip(self))]
    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        self.call(
            "delete_ingress",
            "Ingress",
            name,
            api.delete(name, &DeleteParams::foreground()),
        )
        .await?;
        debug!("Deleted ingress");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        self.call("get_secret", "Secret", name, api.get(name)).await
    }

    #[instrument(skip(self, secret), fields(name = %secret.name_any()))]
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.name_any();
        self.call(
            "create_secret",
            "Secret",
            &name,
            api.create(&PostParams::default(), secret),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        self.call(
            "delete_secret",
            "Secret",
            name,
            api.delete(name, &DeleteParams::default()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_app(&self, namespace: &str, name: &str) -> Result<App, StoreError> {
        let api: Api<App> = Api::namespaced(self.client.clone(), namespace);
        self.call("get_app", "App", name, api.get(name)).await
    }

    #[instrument(skip(self))]
    async fn list_events(&self, namespace: &str, uid: &str) -> Result<Vec<Event>, StoreError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().fields(&format!("involvedObject.uid={uid}"));
        let list = self
            .call("list_events", "Event", uid, api.list(&params))
            .await?;
        Ok(list.items)
    }
}

/// Implement trait for Arc-wrapped stores to support shared ownership
#[async_trait]
impl<T: ClusterStore + ?Sized> ClusterStore for Arc<T> {
    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, StoreError> {
        (**self).list_services(namespace, selector).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        (**self).get_ingress(namespace, name).await
    }

    async fn create_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        (**self).create_ingress(namespace, ingress).await
    }

    async fn replace_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        (**self).replace_ingress(namespace, ingress).await
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        (**self).delete_ingress(namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        (**self).get_secret(namespace, name).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        (**self).create_secret(namespace, secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        (**self).delete_secret(namespace, name).await
    }

    async fn get_app(&self, namespace: &str, name: &str) -> Result<App, StoreError> {
        (**self).get_app(namespace, name).await
    }

    async fn list_events(&self, namespace: &str, uid: &str) -> Result<Vec<Event>, StoreError> {
        (**self).list_events(namespace, uid).await
    }
}
