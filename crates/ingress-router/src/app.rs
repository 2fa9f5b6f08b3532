//! Application registration CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// App spec - registration record of a deployed application
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ingress-router.io",
    version = "v1",
    kind = "App",
    plural = "apps",
    namespaced = true,
    printcolumn = r#"{"name":"Namespace", "type":"string", "jsonPath":".spec.namespaceName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Namespace the application's services and routes live in
    #[serde(default)]
    pub namespace_name: Option<String>,
}
