//! Errors returned by router operations

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RouterError {
    /// No service matched the application (and process, when several exist)
    #[error("{}", no_service_message(.app, .process.as_deref()))]
    NoBackendService {
        app: String,
        process: Option<String>,
    },

    /// Removal refused while the route is swapped with another application
    #[error("app {app} is swapped with {partner}, swap back before removing")]
    AppSwapped { app: String, partner: String },

    #[error("cluster store error: {0}")]
    Store(#[from] StoreError),

    /// Both the swap and its compensating write failed; routes are inconsistent
    #[error("failed to rollback swap: {source}; rollback error: {rollback}")]
    SwapRollbackFailed {
        #[source]
        source: StoreError,
        rollback: StoreError,
    },

    /// A certificate secret exists without a route object referencing it
    #[error("certificate secret {secret} left orphaned: {source}")]
    CertificateOrphaned {
        secret: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid value {value:?} for option {option}: {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    #[error("service {service} declares no ports")]
    ServiceWithoutPorts { service: String },

    #[error("service {service} does not expose port {port}")]
    ExposedPortNotDeclared { service: String, port: u16 },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

fn no_service_message(app: &str, process: Option<&str>) -> String {
    match process {
        Some(process) => format!("no service found for app {app:?} and process {process:?}"),
        None => format!("no service found for app {app:?}"),
    }
}

impl RouterError {
    /// Whether this error came from a store lookup that found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, RouterError::Store(e) if e.is_not_found())
    }
}
