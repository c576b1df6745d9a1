use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DynamicObject, ListParams, ObjectMeta, PostParams};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use smoke_poll::{FetchError, ResourceFetcher, ResourceObservation, ResourceQuery};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{ClusterError, classify_kube_error};
use crate::resources::{ClusterResources, canonical_kind, state_of};

/// Cluster reads through the Kubernetes API. Kinds are resolved with API
/// discovery, run once per client on first use.
pub struct KubeCluster {
    client: Client,
    discovered: OnceCell<Vec<(ApiResource, ApiCapabilities)>>,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovered: OnceCell::new(),
        }
    }

    /// Builds a client from the local kubeconfig or in-cluster environment.
    pub async fn connect() -> Result<Self, ClusterError> {
        let client = Client::try_default().await.map_err(ClusterError::Client)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn resources(
        &self,
    ) -> Result<&[(ApiResource, ApiCapabilities)], FetchError> {
        self.discovered
            .get_or_try_init(|| async {
                let discovery = Discovery::new(self.client.clone())
                    .run()
                    .await
                    .map_err(|e| classify_kube_error(&e, "api discovery"))?;
                let all: Vec<_> = discovery
                    .groups()
                    .flat_map(|g| g.recommended_resources())
                    .collect();
                debug!(count = all.len(), "discovered api resources");
                Ok(all)
            })
            .await
            .map(Vec::as_slice)
    }

    async fn api_for(
        &self,
        kind: &str,
        namespace: &str,
    ) -> Result<Api<DynamicObject>, FetchError> {
        let (ar, caps) = resolve_kind(self.resources().await?, kind)
            .ok_or_else(|| {
                FetchError::Invalid(format!("unknown resource kind `{kind}`"))
            })?;
        let api = match caps.scope {
            Scope::Cluster => Api::all_with(self.client.clone(), ar),
            Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, ar)
            }
        };
        Ok(api)
    }
}

/// Finds the discovered resource for a kind written the way the CLI accepts
/// it: plural, singular, short name, or `name.group`.
pub(crate) fn resolve_kind<'a, C>(
    resources: &'a [(ApiResource, C)],
    kind: &str,
) -> Option<&'a (ApiResource, C)> {
    let (name, group) = match kind.split_once('.') {
        Some((n, g)) => (n, Some(g)),
        None => (kind, None),
    };
    let wanted = canonical_kind(name);
    resources.iter().find(|(ar, _)| {
        (ar.plural == wanted || ar.kind.eq_ignore_ascii_case(&wanted))
            && group.is_none_or(|g| ar.group == g)
    })
}

fn observation(
    obj: &DynamicObject,
    json_path: Option<&str>,
) -> Result<ResourceObservation, FetchError> {
    let value = serde_json::to_value(obj).map_err(|e| {
        FetchError::Invalid(format!("{}: {e}", obj.name_any()))
    })?;
    let state = state_of(&value, json_path)?;
    Ok(ResourceObservation::new(obj.name_any(), state))
}

#[async_trait]
impl ResourceFetcher for KubeCluster {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError> {
        let api = self.api_for(&query.kind, &query.namespace).await?;
        let obj = api
            .get(&query.name)
            .await
            .map_err(|e| classify_kube_error(&e, &query.to_string()))?;
        observation(&obj, query.json_path.as_deref())
    }
}

#[async_trait]
impl ClusterResources for KubeCluster {
    async fn list(
        &self,
        kind: &str,
        namespace: &str,
    ) -> Result<Vec<ResourceObservation>, FetchError> {
        let api = self.api_for(kind, namespace).await?;
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(&e, &format!("{kind} -n {namespace}")))?;
        list.items.iter().map(|obj| observation(obj, None)).collect()
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, FetchError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let found = api
            .get_opt(name)
            .await
            .map_err(|e| classify_kube_error(&e, &format!("namespace/{name}")))?;
        Ok(found.is_some())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), FetchError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(namespace = %name, "created namespace");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
            Err(e) => Err(classify_kube_error(&e, &format!("namespace/{name}"))),
        }
    }

    async fn ping(&self) -> Result<(), FetchError> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| classify_kube_error(&e, "apiserver version"))?;
        debug!(version = %version.git_version, "cluster reachable");
        Ok(())
    }
}
