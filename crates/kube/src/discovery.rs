use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{APIGroup, APIGroupList, APIResourceList, GroupVersionForDiscovery},
    version::Info,
};
use kube::api::ApiResource;
use kubecd_common::kube::SERVER_GROUPS_CACHE_KEY;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{KubeError, Result};

/// The discovery surface of one cluster.
#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
    async fn server_groups(&self) -> Result<APIGroupList>;

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList>;

    async fn server_version(&self) -> Result<Info>;

    async fn openapi_schema(&self) -> Result<serde_json::Value>;
}

#[async_trait]
impl<T: DiscoveryInterface + ?Sized> DiscoveryInterface for Arc<T> {
    async fn server_groups(&self) -> Result<APIGroupList> {
        (**self).server_groups().await
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        (**self).server_resources_for_group_version(group_version).await
    }

    async fn server_version(&self) -> Result<Info> {
        (**self).server_version().await
    }

    async fn openapi_schema(&self) -> Result<serde_json::Value> {
        (**self).openapi_schema().await
    }
}

/// Discovery straight against the API server.
#[derive(Clone)]
pub struct LiveDiscovery {
    client: kube::Client,
}

impl LiveDiscovery {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &kube::Client {
        &self.client
    }
}

#[async_trait]
impl DiscoveryInterface for LiveDiscovery {
    async fn server_groups(&self) -> Result<APIGroupList> {
        let core = self.client.list_core_api_versions().await?;
        let mut groups = self.client.list_api_groups().await?;
        if !core.versions.is_empty() {
            // the legacy core group is served from /api and has no name
            let versions: Vec<GroupVersionForDiscovery> = core
                .versions
                .iter()
                .map(|v| GroupVersionForDiscovery {
                    group_version: v.clone(),
                    version: v.clone(),
                })
                .collect();
            groups.groups.insert(
                0,
                APIGroup {
                    name: String::new(),
                    preferred_version: versions.first().cloned(),
                    server_address_by_client_cidrs: None,
                    versions,
                },
            );
        }
        Ok(groups)
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        let list = if group_version.contains('/') {
            self.client.list_api_group_resources(group_version).await?
        } else {
            self.client.list_core_api_resources(group_version).await?
        };
        Ok(list)
    }

    async fn server_version(&self) -> Result<Info> {
        Ok(self.client.apiserver_version().await?)
    }

    async fn openapi_schema(&self) -> Result<serde_json::Value> {
        let request = http::Request::get("/openapi/v2").body(Vec::new())?;
        Ok(self.client.request::<serde_json::Value>(request).await?)
    }
}

#[derive(Clone)]
enum CachedContent {
    Groups(APIGroupList),
    Resources(APIResourceList),
}

struct CacheEntry {
    content: CachedContent,
    created_at: Instant,
}

/// In-memory discovery responses shared by every client built in this
/// process, keyed by cluster and then by `servergroups` or group-version.
///
/// Entries live for `ttl`. Clients get their own session on top of the
/// shared entries, see [`CachedDiscoveryClient`].
pub struct DiscoveryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a new session for `cluster` on top of `delegate`.
    pub fn client<D: DiscoveryInterface>(
        self: &Arc<Self>,
        cluster: &str,
        delegate: D,
    ) -> CachedDiscoveryClient<D> {
        CachedDiscoveryClient {
            cache: self.clone(),
            cluster: cluster.to_string(),
            delegate,
            session: Mutex::new(Session {
                owned: HashSet::new(),
                invalidated: false,
                fresh: true,
            }),
        }
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for cluster in entries.values_mut() {
            cluster.retain(|_, entry| now < entry.created_at + self.ttl);
        }
        entries.retain(|_, cluster| !cluster.is_empty());
    }
}

struct Session {
    owned: HashSet<String>,
    invalidated: bool,
    fresh: bool,
}

/// A discovery client that serves from the shared [`DiscoveryCache`]
/// where it can and tracks whether everything it served was fetched by
/// itself.
pub struct CachedDiscoveryClient<D> {
    cache: Arc<DiscoveryCache>,
    cluster: String,
    delegate: D,
    session: Mutex<Session>,
}

impl<D: DiscoveryInterface> CachedDiscoveryClient<D> {
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub async fn get_groups(&self) -> Result<APIGroupList> {
        if let Some(CachedContent::Groups(groups)) = self.cached(SERVER_GROUPS_CACHE_KEY) {
            return Ok(groups);
        }

        let groups = self.delegate.server_groups().await?;
        if groups.groups.is_empty() {
            debug!(cluster = %self.cluster, "not caching empty server groups");
            return Ok(groups);
        }
        self.store(SERVER_GROUPS_CACHE_KEY, CachedContent::Groups(groups.clone()));
        Ok(groups)
    }

    pub async fn get_resource_list(&self, group_version: &str) -> Result<APIResourceList> {
        if let Some(CachedContent::Resources(list)) = self.cached(group_version) {
            return Ok(list);
        }

        let list = self
            .delegate
            .server_resources_for_group_version(group_version)
            .await?;
        self.store(group_version, CachedContent::Resources(list.clone()));
        Ok(list)
    }

    pub async fn server_version(&self) -> Result<Info> {
        self.delegate.server_version().await
    }

    pub async fn openapi_schema(&self) -> Result<serde_json::Value> {
        self.delegate.openapi_schema().await
    }

    /// Whether every lookup served so far came from entries this session
    /// populated itself.
    pub fn fresh(&self) -> bool {
        let _entries = self.cache.entries.lock();
        self.session.lock().fresh
    }

    /// Stops trusting entries this session did not populate itself.
    pub fn invalidate(&self) {
        let _entries = self.cache.entries.lock();
        let mut session = self.session.lock();
        session.owned.clear();
        session.invalidated = true;
        session.fresh = true;
    }

    fn cached(&self, key: &str) -> Option<CachedContent> {
        let entries = self.cache.entries.lock();
        let mut session = self.session.lock();
        let entry = entries.get(&self.cluster)?.get(key)?;

        let owned = session.owned.contains(key);
        if session.invalidated && !owned {
            return None;
        }
        if Instant::now() >= entry.created_at + self.cache.ttl {
            return None;
        }

        session.fresh = session.fresh && owned;
        Some(entry.content.clone())
    }

    fn store(&self, key: &str, content: CachedContent) {
        let mut entries = self.cache.entries.lock();
        let mut session = self.session.lock();
        entries.entry(self.cluster.clone()).or_default().insert(
            key.to_string(),
            CacheEntry {
                content,
                created_at: Instant::now(),
            },
        );
        session.owned.insert(key.to_string());
    }
}

/// The coordinates of a listable resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    /// Plural name, e.g. `deployments`.
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

impl GroupVersionResource {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}

/// The preferred version of every resource a cluster serves, indexed by
/// kind.
#[derive(Debug, Clone, Default)]
pub struct ServerResources {
    by_kind: HashMap<String, Vec<GroupVersionResource>>,
}

impl ServerResources {
    /// Gathers the resource catalog through `client`. When the gathered
    /// data was not all fetched by this session, the session is
    /// invalidated and the catalog gathered once more.
    ///
    /// Fails when any preferred group-version cannot be listed.
    pub async fn discover<D: DiscoveryInterface>(
        client: &CachedDiscoveryClient<D>,
    ) -> Result<Self> {
        let resources = Self::gather(client).await?;
        if client.fresh() {
            return Ok(resources);
        }

        debug!(cluster = client.cluster(), "discovery used stale data, retrying");
        client.invalidate();
        Self::gather(client).await
    }

    async fn gather<D: DiscoveryInterface>(client: &CachedDiscoveryClient<D>) -> Result<Self> {
        let groups = client.get_groups().await?;
        if groups.groups.is_empty() {
            return Err(KubeError::Discovery(format!(
                "cluster {} returned no API groups",
                client.cluster()
            )));
        }

        let mut resources = ServerResources::default();
        for group in &groups.groups {
            let Some(preferred) = group
                .preferred_version
                .as_ref()
                .or_else(|| group.versions.first())
            else {
                continue;
            };

            // an incomplete catalog would silently drop kinds from the snapshot
            let list = client.get_resource_list(&preferred.group_version).await?;

            for resource in list.resources {
                // subresources such as deployments/scale
                if resource.name.contains('/') {
                    continue;
                }
                resources.insert(GroupVersionResource {
                    group: group.name.clone(),
                    version: preferred.version.clone(),
                    resource: resource.name,
                    kind: resource.kind,
                    namespaced: resource.namespaced,
                });
            }
        }
        Ok(resources)
    }

    pub fn insert(&mut self, gvr: GroupVersionResource) {
        self.by_kind
            .entry(gvr.kind.to_ascii_lowercase())
            .or_default()
            .push(gvr);
    }

    /// Resolves `kind`, preferring the entry matching `api_version` when
    /// one is given and served.
    pub fn resolve(&self, api_version: Option<&str>, kind: &str) -> Option<&GroupVersionResource> {
        let candidates = self.by_kind.get(&kind.to_ascii_lowercase())?;
        api_version
            .and_then(|api_version| {
                candidates
                    .iter()
                    .find(|gvr| gvr.api_version() == api_version)
            })
            .or_else(|| candidates.first())
    }

}
