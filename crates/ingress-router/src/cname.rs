//! Alias (CNAME) sibling route objects
//!
//! Every alias host gets its own route object pointing at the same backend.
//! The set of aliases last requested is recorded as a comma-joined
//! annotation on the primary route object and is the only record used to
//! find siblings that must go.

use std::collections::BTreeSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info, instrument};

use crate::config::annotations;
use crate::desired::{DesiredStateBuilder, RouteKind};
use crate::diff;
use crate::error::RouterError;
use crate::naming;
use crate::options::{BackendId, RoutingOptions};
use crate::resolver::BackendTarget;
use crate::store::ClusterStore;

/// Set of alias hostnames
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasSet(BTreeSet<String>);

impl AliasSet {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            hosts
                .into_iter()
                .map(Into::into)
                .filter(|h: &String| !h.is_empty())
                .collect(),
        )
    }

    /// Parse the comma-joined annotation value
    pub fn from_annotation(value: &str) -> Self {
        Self::new(value.split(',').map(str::trim))
    }

    /// Aliases recorded on a live primary route object
    pub fn recorded_on(ingress: &Ingress) -> Self {
        ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(annotations::ALIASES))
            .map(|value| Self::from_annotation(value))
            .unwrap_or_default()
    }

    /// Sorted, comma-joined form stored on the primary route object
    pub fn to_annotation(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Aliases in `self` that `previous` did not have
    pub fn additions(&self, previous: &AliasSet) -> AliasSet {
        AliasSet(self.0.difference(&previous.0).cloned().collect())
    }

    /// Aliases in `previous` that `self` no longer has
    pub fn removals(&self, previous: &AliasSet) -> AliasSet {
        AliasSet(previous.0.difference(&self.0).cloned().collect())
    }

    pub fn union(&self, other: &AliasSet) -> AliasSet {
        AliasSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// What an Ensure does with aliases
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasPlan {
    /// Aliases whose siblings must exist afterwards; recorded on the primary
    pub keep: AliasSet,
    pub remove: AliasSet,
}

impl AliasPlan {
    /// With `preserve`, nothing is removed and previously recorded aliases
    /// stay recorded alongside the requested ones
    pub fn new(requested: &AliasSet, previous: &AliasSet, preserve: bool) -> Self {
        if preserve {
            Self {
                keep: requested.union(previous),
                remove: AliasSet::default(),
            }
        } else {
            Self {
                keep: requested.clone(),
                remove: requested.removals(previous),
            }
        }
    }
}

/// Maintains sibling route objects for alias hosts
pub struct CNameManager {
    store: Arc<dyn ClusterStore>,
    builder: DesiredStateBuilder,
}

impl CNameManager {
    pub fn new(store: Arc<dyn ClusterStore>, builder: DesiredStateBuilder) -> Self {
        Self { store, builder }
    }

    /// Converge one sibling per alias in `aliases`
    #[instrument(skip(self, service, target, opts, aliases), fields(app = %id.app, count = aliases.len()))]
    pub async fn ensure(
        &self,
        id: &BackendId,
        namespace: &str,
        service: &Service,
        target: &BackendTarget,
        opts: &RoutingOptions,
        aliases: &AliasSet,
    ) -> Result<(), RouterError> {
        for alias in aliases.iter() {
            let desired =
                self.builder
                    .build(id, namespace, service, target, opts, RouteKind::Alias(alias));
            let (_, outcome) = diff::converge(self.store.as_ref(), desired).await?;
            debug!(alias = %alias, ?outcome, "Alias route converged");
        }
        Ok(())
    }

    /// Delete the siblings of `aliases`, treating absent ones as removed
    #[instrument(skip(self, aliases), fields(app = %id.app))]
    pub async fn remove(
        &self,
        id: &BackendId,
        namespace: &str,
        aliases: &AliasSet,
    ) -> Result<(), RouterError> {
        for alias in aliases.iter() {
            let name = naming::alias_route_name(id, alias);
            match self.store.delete_ingress(namespace, &name).await {
                Ok(()) => info!(alias = %alias, "Removed alias route"),
                Err(e) if e.is_not_found() => debug!(alias = %alias, "Alias route already absent"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
