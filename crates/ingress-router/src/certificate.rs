//! TLS certificate secrets attached to primary route objects

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::IngressTLS;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use tracing::{info, instrument, warn};

use crate::config::labels;
use crate::error::RouterError;
use crate::naming;
use crate::options::BackendId;
use crate::store::{ClusterStore, StoreError};

const SECRET_TYPE: &str = "kubernetes.io/tls";
const CERT_KEY: &str = "tls.crt";
const PRIVATE_KEY: &str = "tls.key";

/// PEM certificate chain and private key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertData {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

pub struct CertificateManager {
    store: Arc<dyn ClusterStore>,
}

impl CertificateManager {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Store the certificate for `host` and reference it from the primary
    /// route object. Fails if a secret for the host already exists.
    #[instrument(skip(self, cert), fields(app = %id.app))]
    pub async fn add(
        &self,
        id: &BackendId,
        namespace: &str,
        host: &str,
        cert: CertData,
    ) -> Result<(), RouterError> {
        let mut primary = self
            .store
            .get_ingress(namespace, &naming::route_name(id))
            .await?;

        let secret_name = naming::secret_name(id, host);
        self.store
            .create_secret(namespace, &tls_secret(id, namespace, host, &secret_name, cert))
            .await?;

        if let Some(spec) = primary.spec.as_mut() {
            spec.tls.get_or_insert_with(Vec::new).push(IngressTLS {
                hosts: Some(vec![host.to_string()]),
                secret_name: Some(secret_name.clone()),
            });
        }
        if let Err(source) = self.store.replace_ingress(namespace, &primary).await {
            return Err(orphaned(secret_name, source));
        }

        info!(host = %host, secret = %secret_name, "Certificate added");
        Ok(())
    }

    #[instrument(skip(self), fields(app = %id.app))]
    pub async fn get(
        &self,
        id: &BackendId,
        namespace: &str,
        host: &str,
    ) -> Result<CertData, RouterError> {
        let secret = self
            .store
            .get_secret(namespace, &naming::secret_name(id, host))
            .await?;
        let mut data = secret.data.unwrap_or_default();
        let certificate = data
            .remove(CERT_KEY)
            .ok_or_else(|| RouterError::MissingField(CERT_KEY.to_string()))?;
        let key = data
            .remove(PRIVATE_KEY)
            .ok_or_else(|| RouterError::MissingField(PRIVATE_KEY.to_string()))?;

        Ok(CertData {
            certificate: certificate.0,
            key: key.0,
        })
    }

    /// Detach the host's TLS entries from the primary route object, then
    /// delete the secret. A secret that cannot be deleted after detaching is
    /// reported as orphaned.
    #[instrument(skip(self), fields(app = %id.app))]
    pub async fn remove(&self, id: &BackendId, namespace: &str, host: &str) -> Result<(), RouterError> {
        match self
            .store
            .get_ingress(namespace, &naming::route_name(id))
            .await
        {
            Ok(mut primary) => {
                if primary
                    .spec
                    .as_mut()
                    .is_some_and(|spec| detach(&mut spec.tls, host))
                {
                    self.store.replace_ingress(namespace, &primary).await?;
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let secret_name = naming::secret_name(id, host);
        match self.store.delete_secret(namespace, &secret_name).await {
            Ok(()) => {
                info!(host = %host, secret = %secret_name, "Certificate removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(orphaned(secret_name, source)),
        }
    }
}

fn orphaned(secret: String, source: StoreError) -> RouterError {
    warn!(secret = %secret, error = %source, "Certificate secret left behind");
    RouterError::CertificateOrphaned { secret, source }
}

/// Drop every TLS entry covering `host`. Returns whether anything changed.
fn detach(tls: &mut Option<Vec<IngressTLS>>, host: &str) -> bool {
    let Some(entries) = tls.take() else {
        return false;
    };
    let before = entries.len();
    let kept: Vec<IngressTLS> = entries
        .into_iter()
        .filter(|entry| !entry.hosts.iter().flatten().any(|h| h == host))
        .collect();
    let changed = kept.len() != before;
    *tls = (!kept.is_empty()).then_some(kept);
    changed
}

fn tls_secret(
    id: &BackendId,
    namespace: &str,
    host: &str,
    name: &str,
    cert: CertData,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([
                (labels::APP.to_string(), id.app.clone()),
                (labels::DOMAIN.to_string(), host.to_string()),
            ])),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([
            (CERT_KEY.to_string(), ByteString(cert.certificate)),
            (PRIVATE_KEY.to_string(), ByteString(cert.key)),
        ])),
        ..Default::default()
    }
}
