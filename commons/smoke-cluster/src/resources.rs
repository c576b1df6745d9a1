use async_trait::async_trait;
use serde_json::Value;
use smoke_poll::{FetchError, ResourceFetcher, ResourceObservation};

use crate::jsonpath;

/// State reported for a resource that exists but has no `.status.phase`.
pub const PRESENT: &str = "Present";

/// Read access to cluster resources, on top of single-resource fetches.
#[async_trait]
pub trait ClusterResources: ResourceFetcher {
    /// Every resource of `kind` in `namespace`, with its default state.
    async fn list(
        &self,
        kind: &str,
        namespace: &str,
    ) -> Result<Vec<ResourceObservation>, FetchError>;

    async fn namespace_exists(&self, name: &str) -> Result<bool, FetchError>;

    async fn create_namespace(&self, name: &str) -> Result<(), FetchError>;

    /// Cheap call that proves the cluster is reachable and we are
    /// authenticated.
    async fn ping(&self) -> Result<(), FetchError>;
}

/// State of a serialized object: the JSON-path value when given, otherwise
/// `.status.phase`, otherwise [`PRESENT`].
pub fn state_of(object: &Value, json_path: Option<&str>) -> Result<String, FetchError> {
    match json_path {
        Some(path) => Ok(jsonpath::extract(object, path)?),
        None => Ok(object
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or(PRESENT)
            .to_string()),
    }
}

/// Resolves common CLI short names to the plural resource name.
pub fn canonical_kind(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    let resolved = match lower.as_str() {
        "po" | "pod" => "pods",
        "svc" | "service" => "services",
        "ns" | "namespace" => "namespaces",
        "project" => "projects",
        "cm" | "configmap" => "configmaps",
        "deploy" | "deployment" => "deployments",
        "csv" | "clusterserviceversion" => "clusterserviceversions",
        "sub" | "subs" | "subscription" => "subscriptions",
        "og" | "operatorgroup" => "operatorgroups",
        "catsrc" | "catalogsource" => "catalogsources",
        "bc" | "buildconfig" => "buildconfigs",
        "build" => "builds",
        "dc" | "deploymentconfig" => "deploymentconfigs",
        "is" | "imagestream" => "imagestreams",
        "route" => "routes",
        _ => return lower,
    };
    resolved.to_string()
}
