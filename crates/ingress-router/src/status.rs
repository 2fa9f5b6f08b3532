//! Readiness of route objects from their load-balancer status

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, instrument, warn};

use crate::error::RouterError;
use crate::naming;
use crate::options::BackendId;
use crate::store::ClusterStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendStatus {
    Ready,
    NotReady,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::Ready => f.write_str("ready"),
            BackendStatus::NotReady => f.write_str("not ready"),
        }
    }
}

/// Readiness with an optional human-readable reason when not ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub status: BackendStatus,
    pub detail: Option<String>,
}

pub struct StatusProber {
    store: Arc<dyn ClusterStore>,
}

impl StatusProber {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(app = %id.app))]
    pub async fn probe(&self, id: &BackendId, namespace: &str) -> Result<StatusReport, RouterError> {
        let primary = self
            .store
            .get_ingress(namespace, &naming::route_name(id))
            .await?;

        if is_ready(&primary) {
            return Ok(StatusReport {
                status: BackendStatus::Ready,
                detail: None,
            });
        }

        Ok(StatusReport {
            status: BackendStatus::NotReady,
            detail: self.detail(namespace, &primary).await,
        })
    }

    /// Latest event recorded for the route object. Lookup failures only
    /// cost the detail.
    async fn detail(&self, namespace: &str, primary: &Ingress) -> Option<String> {
        let uid = primary.metadata.uid.as_deref()?;
        match self.store.list_events(namespace, uid).await {
            Ok(events) => latest_event(events),
            Err(e) => {
                warn!(error = %e, "Could not list events for route object");
                None
            }
        }
    }
}

/// First load-balancer entry carries an address
fn is_ready(ingress: &Ingress) -> bool {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|entries| entries.first())
        .is_some_and(|entry| {
            entry.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                || entry.hostname.as_deref().is_some_and(|h| !h.is_empty())
        })
}

fn latest_event(events: Vec<Event>) -> Option<String> {
    let event = events
        .into_iter()
        .max_by_key(|event| event.last_timestamp.clone())?;
    debug!(reason = ?event.reason, "Latest route event");
    let message = event.message.unwrap_or_default();
    Some(match event.reason {
        Some(reason) => format!("{reason}: {message}"),
        None => message,
    })
}
