//! Change detection and create-or-update convergence
//!
//! The comparison is one-sided for metadata: only keys the
//! desired route sets are checked, so labels and annotations added by other
//! writers never trigger an update (and are never removed by one).

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info, instrument};

use crate::desired::DesiredRoute;
use crate::route;
use crate::store::{ClusterStore, StoreError};

/// Outcome of converging one route object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    Created,
    Updated,
    Unchanged,
}

/// Whether writing `desired` would change `existing`
pub fn has_changes(existing: &Ingress, desired: &DesiredRoute) -> bool {
    if existing.spec.as_ref() != Some(&desired.spec()) {
        debug!(name = %desired.name, "Route spec differs");
        return true;
    }

    let empty = BTreeMap::new();
    let existing_annotations = existing.metadata.annotations.as_ref().unwrap_or(&empty);
    if let Some(key) = missing_key(existing_annotations, &desired.annotations) {
        debug!(name = %desired.name, annotation = %key, "Annotation differs");
        return true;
    }
    if let Some(key) = desired
        .removed_annotations
        .iter()
        .find(|key| existing_annotations.contains_key(*key))
    {
        debug!(name = %desired.name, annotation = %key, "Annotation pending removal");
        return true;
    }

    let existing_labels = existing.metadata.labels.as_ref().unwrap_or(&empty);
    if let Some(key) = missing_key(existing_labels, &desired.labels) {
        debug!(name = %desired.name, label = %key, "Label differs");
        return true;
    }

    false
}

/// First desired key whose value is absent or different on the existing side
fn missing_key<'a>(
    existing: &BTreeMap<String, String>,
    desired: &'a BTreeMap<String, String>,
) -> Option<&'a str> {
    desired
        .iter()
        .find(|(key, value)| existing.get(*key) != Some(*value))
        .map(|(key, _)| key.as_str())
}

/// Create the route object when absent, otherwise update it in place when
/// [`has_changes`] reports a difference. Returns the live object after
/// convergence and what was done.
pub async fn converge(
    store: &dyn ClusterStore,
    desired: DesiredRoute,
) -> Result<(Ingress, Convergence), StoreError> {
    let existing = route::fetch(store, &desired.namespace, &desired.name).await?;
    apply(store, existing, desired).await
}

/// [`converge`] against an already fetched live object
#[instrument(skip_all, fields(name = %desired.name, namespace = %desired.namespace))]
pub async fn apply(
    store: &dyn ClusterStore,
    existing: Option<Ingress>,
    mut desired: DesiredRoute,
) -> Result<(Ingress, Convergence), StoreError> {
    let namespace = desired.namespace.clone();

    let Some(existing) = existing else {
        let created = store
            .create_ingress(&namespace, &desired.into_ingress())
            .await?;
        info!("Created route object");
        return Ok((created, Convergence::Created));
    };

    desired.carry_over(&existing);
    if !has_changes(&existing, &desired) {
        debug!("Route object up to date");
        return Ok((existing, Convergence::Unchanged));
    }

    let updated = store
        .replace_ingress(&namespace, &desired.merge_into(existing))
        .await?;
    info!("Updated route object");
    Ok((updated, Convergence::Updated))
}
