//! Backend identity and per-request routing options

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{options, RouterConfig};
use crate::error::RouterError;

/// Suffix on an option name that removes the annotation instead of setting it
pub const DELETION_MARKER: char = '-';

/// Identity of a logical backend
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendId {
    /// Application name
    pub app: String,
    /// Optional process selector, defaults to the web process
    pub process: Option<String>,
}

impl BackendId {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            process: None,
        }
    }

    pub fn with_process(app: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            process: Some(process.into()),
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.process {
            Some(process) => write!(f, "{}/{}", self.app, process),
            None => f.write_str(&self.app),
        }
    }
}

/// Routing options sent with an Ensure request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingOptions {
    /// Explicit host, bypasses prefix/suffix composition
    pub domain: Option<String>,
    pub domain_prefix: Option<String>,
    /// Overrides the operator's default suffix
    pub domain_suffix: Option<String>,
    /// HTTP path of the single route rule
    pub path: Option<String>,
    /// Free-form options translated into annotations
    pub additional: BTreeMap<String, String>,
    pub acme: bool,
    pub pool: Option<String>,
    /// Service port to route to instead of the first declared one
    pub exposed_port: Option<u16>,
}

impl RoutingOptions {
    /// Split a flat option map into recognized fields and passthrough options.
    ///
    /// Every value is validated before anything is returned, so a malformed
    /// option never leads to a partial write.
    pub fn from_opts(opts: BTreeMap<String, String>) -> Result<Self, RouterError> {
        let mut parsed = RoutingOptions::default();

        for (name, value) in opts {
            match name.as_str() {
                options::DOMAIN => parsed.domain = non_empty(value),
                options::DOMAIN_PREFIX => parsed.domain_prefix = non_empty(value),
                options::DOMAIN_SUFFIX => parsed.domain_suffix = non_empty(value),
                options::ROUTE => parsed.path = non_empty(value),
                options::POOL => parsed.pool = non_empty(value),
                options::ACME => parsed.acme = parse_bool(&name, &value)?,
                options::EXPOSED_PORT => parsed.exposed_port = parse_port(&name, &value)?,
                _ => {
                    parsed.additional.insert(name, value);
                }
            }
        }

        Ok(parsed)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(option: &str, value: &str) -> Result<bool, RouterError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "false" => Ok(false),
        "true" => Ok(true),
        _ => Err(RouterError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_port(option: &str, value: &str) -> Result<Option<u16>, RouterError> {
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(RouterError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            reason: "expected a port number between 1 and 65535".to_string(),
        }),
        Ok(port) => Ok(Some(port)),
    }
}

/// Documentation for every option the router understands
pub fn supported_options(config: &RouterConfig) -> BTreeMap<String, String> {
    let mut supported = BTreeMap::from([
        (
            options::DOMAIN.to_string(),
            "Host used instead of the generated one".to_string(),
        ),
        (
            options::DOMAIN_PREFIX.to_string(),
            "Prefix prepended to the generated host".to_string(),
        ),
        (
            options::DOMAIN_SUFFIX.to_string(),
            "Suffix used instead of the default domain suffix".to_string(),
        ),
        (
            options::ROUTE.to_string(),
            "HTTP path routed to the application".to_string(),
        ),
        (
            options::ACME.to_string(),
            "Request a certificate from the ACME issuer (true/false)".to_string(),
        ),
        (
            options::POOL.to_string(),
            "Pool whose configured labels are added".to_string(),
        ),
        (
            options::EXPOSED_PORT.to_string(),
            "Service port receiving traffic".to_string(),
        ),
    ]);

    for (option, mapping) in config.option_mappings() {
        let doc = mapping.doc.unwrap_or(mapping.annotation);
        supported.insert(option, doc);
    }

    supported
}
