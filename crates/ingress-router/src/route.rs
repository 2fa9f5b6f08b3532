//! Accessors for fields of live route objects

use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::ResourceExt;

use crate::config::labels;
use crate::store::{ClusterStore, StoreError};

/// Fetch a route object, mapping "not found" to `None`
pub async fn fetch(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
) -> Result<Option<Ingress>, StoreError> {
    match store.get_ingress(namespace, name).await {
        Ok(ingress) => Ok(Some(ingress)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Host of the first rule
pub fn primary_host(ingress: &Ingress) -> Option<&str> {
    ingress
        .spec
        .as_ref()?
        .rules
        .as_ref()?
        .first()?
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
}

/// Backend of the first path of the first rule
pub fn backend(ingress: &Ingress) -> Option<&IngressBackend> {
    ingress
        .spec
        .as_ref()?
        .rules
        .as_ref()?
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .map(|path| &path.backend)
        .next()
}

/// Point every path of every rule at `target`
pub fn set_backend(ingress: &mut Ingress, target: &IngressBackend) {
    let Some(rules) = ingress.spec.as_mut().and_then(|s| s.rules.as_mut()) else {
        return;
    };
    for path in rules
        .iter_mut()
        .filter_map(|rule| rule.http.as_mut())
        .flat_map(|http| http.paths.iter_mut())
    {
        path.backend = target.clone();
    }
}

/// Application this route is currently swapped with
pub fn swap_partner(ingress: &Ingress) -> Option<&str> {
    ingress
        .labels()
        .get(labels::SWAPPED_WITH)
        .map(String::as_str)
        .filter(|partner| !partner.is_empty())
}
