//! Router capabilities
//!
//! Every router supports the base [`Router`] operations. Certificate
//! management and status reporting are optional capabilities discovered at
//! runtime through [`Router::tls`] and [`Router::status`].

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::certificate::CertData;
use crate::cname::AliasSet;
use crate::error::RouterError;
use crate::options::{BackendId, RoutingOptions};
use crate::status::StatusReport;

/// Input of an Ensure call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnsureRequest {
    pub opts: RoutingOptions,
    /// Full set of alias hosts that must route to the backend
    pub cnames: AliasSet,
    /// Keep previously recorded aliases that are not requested anymore
    pub preserve_old_cnames: bool,
}

impl EnsureRequest {
    /// Parse raw options and alias hosts into a request
    pub fn from_opts<I, S>(
        opts: BTreeMap<String, String>,
        cnames: I,
        preserve_old_cnames: bool,
    ) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            opts: RoutingOptions::from_opts(opts)?,
            cnames: AliasSet::new(cnames),
            preserve_old_cnames,
        })
    }
}

#[async_trait]
pub trait Router: Send + Sync {
    /// Converge the backend's route objects to the request
    async fn ensure(&self, id: &BackendId, request: EnsureRequest) -> Result<(), RouterError>;

    /// Delete the backend's route objects; refused while swapped
    async fn remove(&self, id: &BackendId) -> Result<(), RouterError>;

    /// Hosts the backend is reachable at
    async fn get_addresses(&self, id: &BackendId) -> Result<Vec<String>, RouterError>;

    /// Exchange the backends of two applications, or revert a previous swap
    async fn swap(&self, src: &BackendId, dst: &BackendId) -> Result<(), RouterError>;

    /// Option names accepted by [`Router::ensure`] with their documentation
    fn supported_options(&self) -> BTreeMap<String, String>;

    fn tls(&self) -> Option<&dyn RouterTls> {
        None
    }

    fn status(&self) -> Option<&dyn RouterStatus> {
        None
    }
}

/// Certificate management capability
#[async_trait]
pub trait RouterTls: Send + Sync {
    async fn add_certificate(
        &self,
        id: &BackendId,
        host: &str,
        cert: CertData,
    ) -> Result<(), RouterError>;

    async fn get_certificate(&self, id: &BackendId, host: &str) -> Result<CertData, RouterError>;

    async fn remove_certificate(&self, id: &BackendId, host: &str) -> Result<(), RouterError>;
}

/// Status reporting capability
#[async_trait]
pub trait RouterStatus: Send + Sync {
    async fn get_backend_status(&self, id: &BackendId) -> Result<StatusReport, RouterError>;
}
