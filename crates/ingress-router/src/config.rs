//! Router configuration and well-known metadata keys

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::options::DELETION_MARKER;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Maps a routing option onto an annotation key
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionAnnotation {
    /// Option name as sent by the caller
    pub option: String,
    /// Annotation key written on route objects
    pub annotation: String,
    /// Human-readable description returned by SupportedOptions
    #[serde(default)]
    pub doc: Option<String>,
}

/// Operator configuration for the routing backend
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Namespace used when an application has no registration record
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Namespace holding application registration records
    #[serde(default)]
    pub registration_namespace: Option<String>,
    /// Default host suffix (`{app}.{domainSuffix}`)
    #[serde(default)]
    pub domain_suffix: String,
    /// Prefix for annotations derived from unrecognized options
    #[serde(default)]
    pub annotations_prefix: String,
    /// Ingress class forced onto every route object
    #[serde(default)]
    pub ingress_class: Option<String>,
    /// Labels added to every route object
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations added to every route object
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Extra labels per pool
    #[serde(default)]
    pub pool_labels: BTreeMap<String, BTreeMap<String, String>>,
    /// Option-to-annotation mappings, merged over the built-in ones
    #[serde(default)]
    pub option_annotations: Vec<OptionAnnotation>,
    /// Per-request timeout for cluster calls (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            registration_namespace: None,
            domain_suffix: String::new(),
            annotations_prefix: String::new(),
            ingress_class: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            pool_labels: BTreeMap::new(),
            option_annotations: Vec::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl RouterConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace cannot be empty".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeoutSeconds must be greater than zero".into(),
            ));
        }
        for mapping in &self.option_annotations {
            if mapping.option.is_empty() || mapping.annotation.is_empty() {
                return Err(ConfigError::Invalid(
                    "optionAnnotations entries need both option and annotation".into(),
                ));
            }
            if mapping.option.ends_with(DELETION_MARKER)
                || mapping.annotation.ends_with(DELETION_MARKER)
            {
                return Err(ConfigError::Invalid(format!(
                    "option mapping {} -> {} ends with the deletion marker",
                    mapping.option, mapping.annotation
                )));
            }
        }
        Ok(())
    }

    /// Namespace where application registration records live
    pub fn registration_namespace(&self) -> &str {
        self.registration_namespace
            .as_deref()
            .unwrap_or(&self.namespace)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Built-in option mappings with the configured ones layered on top
    pub fn option_mappings(&self) -> BTreeMap<String, OptionAnnotation> {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            options::CLASS.to_string(),
            OptionAnnotation {
                option: options::CLASS.to_string(),
                annotation: annotations::INGRESS_CLASS.to_string(),
                doc: Some("Ingress class for the Ingress object".to_string()),
            },
        );
        for mapping in &self.option_annotations {
            let doc = match (&mapping.doc, mappings.get(&mapping.option)) {
                (Some(doc), _) => Some(doc.clone()),
                (None, Some(builtin)) => builtin.doc.clone(),
                (None, None) => None,
            };
            mappings.insert(
                mapping.option.clone(),
                OptionAnnotation {
                    doc,
                    ..mapping.clone()
                },
            );
        }
        mappings
    }

    /// Annotation key for an unrecognized option
    pub fn prefixed_annotation(&self, name: &str) -> String {
        if self.annotations_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.annotations_prefix, name)
        }
    }
}

/// Labels written or read by the router
pub mod labels {
    /// Owning application
    pub const APP: &str = "ingress-router.io/app";
    /// Process exposed by a backend service
    pub const PROCESS: &str = "ingress-router.io/process";
    /// Headless services never receive routes
    pub const HEADLESS: &str = "ingress-router.io/headless";
    /// Pool the application runs in
    pub const POOL: &str = "ingress-router.io/pool";
    /// Name of the backend service a route was built for
    pub const BASE_SERVICE_NAME: &str = "ingress-router.io/base-service-name";
    /// Namespace of the backend service a route was built for
    pub const BASE_SERVICE_NAMESPACE: &str = "ingress-router.io/base-service-namespace";
    /// Marks alias sibling route objects
    pub const ALIAS_ROUTE: &str = "ingress-router.io/is-cname";
    /// Partner application while two routes are swapped
    pub const SWAPPED_WITH: &str = "ingress-router.io/swapped-with";
    /// Host a certificate secret belongs to
    pub const DOMAIN: &str = "ingress-router.io/domain";

    /// Process selected when an application exposes several services
    pub const WEB_PROCESS: &str = "web";
}

/// Annotations written or read by the router
pub mod annotations {
    /// Enables certificate issuance by an ACME controller
    pub const ACME: &str = "kubernetes.io/tls-acme";
    /// Comma-joined alias hosts requested on the last Ensure
    pub const ALIASES: &str = "ingress-router.io/cnames";
    /// Ingress class selector
    pub const INGRESS_CLASS: &str = "kubernetes.io/ingress.class";
}

/// Recognized routing option names
pub mod options {
    pub const DOMAIN: &str = "domain";
    pub const DOMAIN_PREFIX: &str = "domain-prefix";
    pub const DOMAIN_SUFFIX: &str = "domain-suffix";
    pub const ROUTE: &str = "route";
    pub const ACME: &str = "tls-acme";
    pub const POOL: &str = "pool";
    pub const EXPOSED_PORT: &str = "exposed-port";
    pub const CLASS: &str = "class";
}
