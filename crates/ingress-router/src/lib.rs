//! ingress-router: per-application routing backends on Kubernetes Ingress
//!
//! Converges a primary Ingress per application, one sibling Ingress per
//! alias host and TLS secrets, on request. See [`IngressService`] for the
//! entry point.

pub mod app;
pub mod certificate;
pub mod cname;
pub mod config;
pub mod desired;
pub mod diff;
pub mod error;
pub mod ingress;
pub mod naming;
pub mod options;
pub mod resolver;
pub mod route;
pub mod router;
pub mod status;
pub mod store;
pub mod swap;

pub use certificate::CertData;
pub use cname::AliasSet;
pub use config::RouterConfig;
pub use error::RouterError;
pub use ingress::IngressService;
pub use options::{BackendId, RoutingOptions};
pub use router::{EnsureRequest, Router, RouterStatus, RouterTls};
pub use status::{BackendStatus, StatusReport};
pub use store::{ClusterStore, KubeStore, StoreError};
