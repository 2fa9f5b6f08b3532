//! Shared harness for router integration tests
//!
//! [`MemoryStore`] is an in-memory cluster store with the semantics the
//! router relies on: label-selector listing, resourceVersion checks on
//! replace, "not found" and "already exists" errors. It counts mutating
//! writes and can be told to fail replaces or deletes of named objects.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ingress_router::app::{App, AppSpec};
use ingress_router::{ClusterStore, StoreError};
use k8s_openapi::api::core::v1::{Event, Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

type Key = (String, String);

#[derive(Default)]
struct State {
    services: Vec<Service>,
    ingresses: HashMap<Key, Ingress>,
    secrets: HashMap<Key, Secret>,
    apps: HashMap<Key, App>,
    events: Vec<Event>,
    /// Successful replaces left per ingress name before they start failing
    failing_replaces: HashMap<String, usize>,
    /// Ingress names whose next delete times out
    failing_deletes: HashSet<String>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    writes: AtomicUsize,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn not_found(kind: &'static str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutating calls (create, replace, delete) seen so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn add_service(&self, service: Service) {
        self.state.lock().unwrap().services.push(service);
    }

    pub fn add_app(&self, namespace: &str, app: App) {
        let name = app.name_any();
        self.state
            .lock()
            .unwrap()
            .apps
            .insert(key(namespace, &name), app);
    }

    pub fn add_event(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    /// Make every replace of the named ingress fail with a conflict
    pub fn fail_replaces_of(&self, name: &str) {
        self.fail_replaces_of_after(name, 0);
    }

    /// Let `successes` replaces of the named ingress through, then fail
    pub fn fail_replaces_of_after(&self, name: &str, successes: usize) {
        self.state
            .lock()
            .unwrap()
            .failing_replaces
            .insert(name.to_string(), successes);
    }

    /// Make the next delete of the named ingress time out
    pub fn fail_next_delete_of(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(name.to_string());
    }

    pub fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.state
            .lock()
            .unwrap()
            .ingresses
            .get(&key(namespace, name))
            .cloned()
    }

    /// Names of all ingresses in a namespace, sorted
    pub fn ingress_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .ingresses
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&key(namespace, name))
            .cloned()
    }

    /// Store an ingress as if written by another client
    pub fn put_ingress(&self, namespace: &str, mut ingress: Ingress) {
        let mut state = self.state.lock().unwrap();
        ingress.metadata.resource_version = Some(state.next_version());
        let name = ingress.name_any();
        state.ingresses.insert(key(namespace, &name), ingress);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace))
            .filter(|s| matches_selector(s.labels(), selector))
            .cloned()
            .collect())
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.ingress(namespace, name)
            .ok_or_else(|| not_found("Ingress", name))
    }

    async fn create_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        self.record_write();
        let mut state = self.state.lock().unwrap();
        let name = ingress.name_any();
        if state.ingresses.contains_key(&key(namespace, &name)) {
            return Err(StoreError::AlreadyExists {
                kind: "Ingress",
                name,
            });
        }
        let mut created = ingress.clone();
        created.metadata.resource_version = Some(state.next_version());
        created.metadata.uid = Some(format!("uid-{name}"));
        created.metadata.namespace = Some(namespace.to_string());
        state
            .ingresses
            .insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace_ingress(
        &self,
        namespace: &str,
        ingress: &Ingress,
    ) -> Result<Ingress, StoreError> {
        self.record_write();
        let mut state = self.state.lock().unwrap();
        let name = ingress.name_any();
        if let Some(remaining) = state.failing_replaces.get_mut(&name) {
            if *remaining == 0 {
                return Err(StoreError::Conflict {
                    kind: "Ingress",
                    name,
                });
            }
            *remaining -= 1;
        }
        let current = state
            .ingresses
            .get(&key(namespace, &name))
            .ok_or_else(|| not_found("Ingress", &name))?;
        if current.metadata.resource_version != ingress.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "Ingress",
                name,
            });
        }
        let mut replaced = ingress.clone();
        replaced.metadata.resource_version = Some(state.next_version());
        state
            .ingresses
            .insert(key(namespace, &name), replaced.clone());
        Ok(replaced)
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record_write();
        let mut state = self.state.lock().unwrap();
        if state.failing_deletes.remove(name) {
            return Err(StoreError::Timeout {
                operation: "delete_ingress",
            });
        }
        state
            .ingresses
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("Ingress", name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.secret(namespace, name)
            .ok_or_else(|| not_found("Secret", name))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        self.record_write();
        let mut state = self.state.lock().unwrap();
        let name = secret.name_any();
        if state.secrets.contains_key(&key(namespace, &name)) {
            return Err(StoreError::AlreadyExists {
                kind: "Secret",
                name,
            });
        }
        let mut created = secret.clone();
        created.metadata.resource_version = Some(state.next_version());
        state.secrets.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record_write();
        self.state
            .lock()
            .unwrap()
            .secrets
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("Secret", name))
    }

    async fn get_app(&self, namespace: &str, name: &str) -> Result<App, StoreError> {
        self.state
            .lock()
            .unwrap()
            .apps
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("App", name))
    }

    async fn list_events(&self, _namespace: &str, uid: &str) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|e| e.involved_object.uid.as_deref() == Some(uid))
            .cloned()
            .collect())
    }
}

/// Backend service labelled with `app`, optionally with a process label
pub fn service(
    namespace: &str,
    name: &str,
    app: &str,
    process: Option<&str>,
    port: i32,
) -> Service {
    let mut labels = BTreeMap::from([("ingress-router.io/app".to_string(), app.to_string())]);
    if let Some(process) = process {
        labels.insert("ingress-router.io/process".to_string(), process.to_string());
    }
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn registration(app: &str, namespace: &str) -> App {
    App::new(
        app,
        AppSpec {
            namespace_name: Some(namespace.to_string()),
        },
    )
}

/// Service name and port the first path of an ingress points at
pub fn backend_of(ingress: &Ingress) -> Option<(String, i32)> {
    let backend = ingress_router::route::backend(ingress)?.service.as_ref()?;
    let port = backend.port.as_ref()?.number?;
    Some((backend.name.clone(), port))
}
