//! Exchange of backend pointers between two applications
//!
//! Swapping is its own inverse: the partner labels are set when the pair is
//! not swapped and cleared when it is, and the backends are exchanged either
//! way. There is no multi-object transaction; a failed second write is
//! compensated by swapping the first object back. An application already
//! swapped with a third one has to be swapped back before it can pair again.

use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{error, info, instrument, warn};

use crate::config::labels;
use crate::error::RouterError;
use crate::naming;
use crate::options::BackendId;
use crate::route;
use crate::store::ClusterStore;

/// One side of a swap: the application and the namespace of its route
#[derive(Clone, Copy, Debug)]
pub struct SwapSide<'a> {
    pub id: &'a BackendId,
    pub namespace: &'a str,
}

pub struct SwapCoordinator {
    store: Arc<dyn ClusterStore>,
}

impl SwapCoordinator {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, src, dst), fields(src = %src.id, dst = %dst.id))]
    pub async fn swap(&self, src: SwapSide<'_>, dst: SwapSide<'_>) -> Result<(), RouterError> {
        let mut src_route = self
            .store
            .get_ingress(src.namespace, &naming::route_name(src.id))
            .await?;
        let mut dst_route = self
            .store
            .get_ingress(dst.namespace, &naming::route_name(dst.id))
            .await?;

        ensure_free_for(&src.id.app, &src_route, &dst.id.app)?;
        ensure_free_for(&dst.id.app, &dst_route, &src.id.app)?;
        exchange(&mut src_route, &src.id.app, &mut dst_route, &dst.id.app)?;

        let mut written_src = self
            .store
            .replace_ingress(src.namespace, &src_route)
            .await?;

        let Err(source) = self.store.replace_ingress(dst.namespace, &dst_route).await else {
            info!(
                swapped = route::swap_partner(&written_src).is_some(),
                "Swap applied"
            );
            return Ok(());
        };

        warn!(error = %source, "Second swap write failed, rolling back");
        exchange(&mut written_src, &src.id.app, &mut dst_route, &dst.id.app)?;
        match self.store.replace_ingress(src.namespace, &written_src).await {
            Ok(_) => Err(source.into()),
            Err(rollback) => {
                error!(error = %rollback, "Swap rollback failed, routes are inconsistent");
                Err(RouterError::SwapRollbackFailed { source, rollback })
            }
        }
    }
}

/// Refuse removal of a route still swapped with another application
pub fn ensure_not_swapped(app: &str, primary: &Ingress) -> Result<(), RouterError> {
    match route::swap_partner(primary) {
        Some(partner) => Err(RouterError::AppSwapped {
            app: app.to_string(),
            partner: partner.to_string(),
        }),
        None => Ok(()),
    }
}

/// Refuse a swap with `other` while the route is swapped with someone else
fn ensure_free_for(app: &str, primary: &Ingress, other: &str) -> Result<(), RouterError> {
    match route::swap_partner(primary) {
        Some(partner) if partner != other => Err(RouterError::AppSwapped {
            app: app.to_string(),
            partner: partner.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Exchange backends and toggle the partner labels of two route objects
fn exchange(
    a: &mut Ingress,
    a_app: &str,
    b: &mut Ingress,
    b_app: &str,
) -> Result<(), RouterError> {
    let (Some(a_backend), Some(b_backend)) =
        (route::backend(a).cloned(), route::backend(b).cloned())
    else {
        return Err(RouterError::MissingField(
            "spec.rules[0].http.paths[0].backend".to_string(),
        ));
    };
    route::set_backend(a, &b_backend);
    route::set_backend(b, &a_backend);
    if let (Some(a_spec), Some(b_spec)) = (a.spec.as_mut(), b.spec.as_mut()) {
        std::mem::swap(&mut a_spec.default_backend, &mut b_spec.default_backend);
    }

    if route::swap_partner(a) == Some(b_app) {
        a.labels_mut().remove(labels::SWAPPED_WITH);
        b.labels_mut().remove(labels::SWAPPED_WITH);
    } else {
        a.labels_mut()
            .insert(labels::SWAPPED_WITH.to_string(), b_app.to_string());
        b.labels_mut()
            .insert(labels::SWAPPED_WITH.to_string(), a_app.to_string());
    }
    Ok(())
}
