//! Desired state of route objects
//!
//! A [`DesiredRoute`] is computed fresh on every request from the resolved
//! backend and the routing options. It is never stored on its own: it is
//! compared against the live object and merged into it.
//!
//! Metadata precedence, later wins:
//! operator labels/annotations < pool labels < option-derived annotations
//! < identity labels.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressSpec,
    IngressTLS,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::config::{annotations, labels, options, RouterConfig};
use crate::naming;
use crate::options::{BackendId, RoutingOptions, DELETION_MARKER};
use crate::resolver::BackendTarget;
use crate::route;

const PATH_TYPE: &str = "ImplementationSpecific";

/// Which route object of an application is being built
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind<'a> {
    Primary,
    /// Sibling route for an alias host
    Alias(&'a str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesiredRoute {
    pub id: BackendId,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Annotations explicitly removed through the deletion marker
    pub removed_annotations: BTreeSet<String>,
    pub host: String,
    pub path: Option<String>,
    pub backend: IngressBackend,
    pub tls: Vec<IngressTLS>,
    /// Legacy single-backend pointer carried over from the live object
    pub default_backend: Option<IngressBackend>,
    pub ingress_class_name: Option<String>,
    pub owner: Option<OwnerReference>,
}

impl DesiredRoute {
    pub fn spec(&self) -> IngressSpec {
        IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(self.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: self.path.clone(),
                        path_type: PATH_TYPE.to_string(),
                        backend: self.backend.clone(),
                    }],
                }),
            }]),
            tls: (!self.tls.is_empty()).then(|| self.tls.clone()),
            default_backend: self.default_backend.clone(),
            ingress_class_name: self.ingress_class_name.clone(),
        }
    }

    /// Adopt the fields of the live object this router does not own:
    /// a legacy default backend, an admission-assigned class, a swapped
    /// backend pointer and TLS entries attached by certificate operations.
    /// The ACME entry of a host the route stopped serving is dropped.
    pub fn carry_over(&mut self, existing: &Ingress) {
        let Some(spec) = existing.spec.as_ref() else {
            return;
        };

        if spec.default_backend.is_some() {
            self.default_backend = spec.default_backend.clone();
        }
        if self.ingress_class_name.is_none() {
            self.ingress_class_name = spec.ingress_class_name.clone();
        }
        if route::swap_partner(existing).is_some() {
            if let Some(swapped) = route::backend(existing) {
                self.backend = swapped.clone();
            }
        }

        let retired_host = route::primary_host(existing)
            .filter(|host| *host != self.host && self.acme_enabled());
        let mut pending = std::mem::take(&mut self.tls);
        let mut merged = Vec::new();
        for entry in spec.tls.iter().flatten() {
            if retired_host.is_some_and(|host| is_acme_entry(&self.id, entry, host)) {
                continue;
            }
            match pending.iter().position(|d| hosts_overlap(d, entry)) {
                Some(pos) => merged.push(pending.remove(pos)),
                None => merged.push(entry.clone()),
            }
        }
        merged.extend(pending);
        self.tls = merged;
    }

    fn acme_enabled(&self) -> bool {
        self.annotations
            .get(annotations::ACME)
            .is_some_and(|v| v == "true")
    }

    /// A brand-new object for the create path
    pub fn into_ingress(self) -> Ingress {
        let spec = self.spec();
        Ingress {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                labels: Some(self.labels),
                annotations: Some(self.annotations),
                owner_references: self.owner.map(|owner| vec![owner]),
                ..Default::default()
            },
            spec: Some(spec),
            status: None,
        }
    }

    /// Merge into the live object for the update path. The live object's
    /// resourceVersion is kept so the write is an optimistic update.
    pub fn merge_into(self, existing: Ingress) -> Ingress {
        let spec = self.spec();
        let mut merged = existing;
        let meta = &mut merged.metadata;

        let mut merged_labels = meta.labels.take().unwrap_or_default();
        merged_labels.extend(self.labels);
        meta.labels = Some(merged_labels);

        let mut merged_annotations = meta.annotations.take().unwrap_or_default();
        merged_annotations.extend(self.annotations);
        for key in &self.removed_annotations {
            merged_annotations.remove(key);
        }
        meta.annotations = Some(merged_annotations);

        if let Some(owner) = self.owner {
            meta.owner_references = Some(vec![owner]);
        }
        merged.spec = Some(spec);
        merged
    }
}

/// Whether `entry` is the ACME-managed TLS entry for exactly `host`
fn is_acme_entry(id: &BackendId, entry: &IngressTLS, host: &str) -> bool {
    matches!(entry.hosts.as_deref(), Some([only]) if only == host)
        && entry.secret_name.as_deref() == Some(naming::secret_name(id, host).as_str())
}

fn hosts_overlap(a: &IngressTLS, b: &IngressTLS) -> bool {
    a.hosts
        .iter()
        .flatten()
        .any(|h| b.hosts.iter().flatten().any(|other| other == h))
}

/// Computes desired route objects from resolved backends and options
#[derive(Clone)]
pub struct DesiredStateBuilder {
    config: Arc<RouterConfig>,
}

impl DesiredStateBuilder {
    pub fn new(config: Arc<RouterConfig>) -> Self {
        Self { config }
    }

    /// Host of the primary route: explicit domain, else
    /// `{prefix.}{app}{.suffix}` with the request suffix overriding the
    /// operator default
    pub fn host(&self, id: &BackendId, opts: &RoutingOptions) -> String {
        if let Some(domain) = &opts.domain {
            return domain.clone();
        }

        let suffix = opts
            .domain_suffix
            .as_deref()
            .unwrap_or(&self.config.domain_suffix);
        let mut host = match &opts.domain_prefix {
            Some(prefix) => format!("{prefix}.{}", id.app),
            None => id.app.clone(),
        };
        if !suffix.is_empty() {
            host.push('.');
            host.push_str(suffix);
        }
        host
    }

    pub fn build(
        &self,
        id: &BackendId,
        namespace: &str,
        service: &Service,
        target: &BackendTarget,
        opts: &RoutingOptions,
        kind: RouteKind<'_>,
    ) -> DesiredRoute {
        let (name, host) = match kind {
            RouteKind::Primary => (naming::route_name(id), self.host(id, opts)),
            RouteKind::Alias(alias) => (naming::alias_route_name(id, alias), alias.to_string()),
        };

        let (annotations, removed_annotations) = self.annotations(opts);
        let mut desired = DesiredRoute {
            id: id.clone(),
            name,
            namespace: namespace.to_string(),
            labels: self.labels(id, target, opts, kind),
            annotations,
            removed_annotations,
            host,
            path: opts.path.clone(),
            backend: target.to_ingress_backend(),
            tls: Vec::new(),
            default_backend: None,
            ingress_class_name: None,
            owner: service.controller_owner_ref(&()),
        };

        // Applied last so the TLS entry always names the final host
        if opts.acme || desired.acme_enabled() {
            desired.tls = vec![IngressTLS {
                hosts: Some(vec![desired.host.clone()]),
                secret_name: Some(naming::secret_name(id, &desired.host)),
            }];
            desired
                .annotations
                .insert(annotations::ACME.to_string(), "true".to_string());
            desired.removed_annotations.remove(annotations::ACME);
        }

        desired
    }

    fn labels(
        &self,
        id: &BackendId,
        target: &BackendTarget,
        opts: &RoutingOptions,
        kind: RouteKind<'_>,
    ) -> BTreeMap<String, String> {
        let mut result = self.config.labels.clone();

        if let Some(pool) = &opts.pool {
            if let Some(pool_labels) = self.config.pool_labels.get(pool) {
                result.extend(pool_labels.clone());
            }
            result.insert(labels::POOL.to_string(), pool.clone());
        }

        result.insert(
            labels::BASE_SERVICE_NAME.to_string(),
            target.service.clone(),
        );
        result.insert(
            labels::BASE_SERVICE_NAMESPACE.to_string(),
            target.namespace.clone(),
        );
        if let RouteKind::Alias(_) = kind {
            result.insert(labels::ALIAS_ROUTE.to_string(), "true".to_string());
        }
        result.insert(labels::APP.to_string(), id.app.clone());
        result
    }

    /// Annotations derived from operator settings and passthrough options,
    /// plus the keys the request asked to remove
    fn annotations(&self, opts: &RoutingOptions) -> (BTreeMap<String, String>, BTreeSet<String>) {
        let mut result = self.config.annotations.clone();
        let mut removed = BTreeSet::new();

        let mut additional = opts.additional.clone();
        if let Some(class) = &self.config.ingress_class {
            additional.insert(options::CLASS.to_string(), class.clone());
        }

        let mappings = self.config.option_mappings();
        for (option, value) in additional {
            let (option, remove) = match option.strip_suffix(DELETION_MARKER) {
                Some(stripped) => (stripped, true),
                None => (option.as_str(), false),
            };
            let key = match mappings.get(option) {
                Some(mapping) => mapping.annotation.clone(),
                None if option.contains('/') => option.to_string(),
                None => self.config.prefixed_annotation(option),
            };
            if remove {
                result.remove(&key);
                removed.insert(key);
            } else {
                result.insert(key, value);
            }
        }

        (result, removed)
    }
}
