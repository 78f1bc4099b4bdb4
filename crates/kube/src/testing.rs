//! Fakes shared by the unit tests of this crate.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery},
    version::Info,
};
use kube::api::{DynamicObject, ListParams};
use kubecd_common::{InfraKind, ProviderConfig, Resource, ResourceStore};
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::{
    client::{ClusterConnector, ClusterHandle},
    discovery::{DiscoveryCache, DiscoveryInterface, GroupVersionResource},
    error::{KubeError, Result},
    lister::KindLister,
};

#[derive(Default)]
pub struct FakeDiscovery {
    pub groups: Vec<APIGroup>,
    pub resources: HashMap<String, APIResourceList>,
    pub group_calls: AtomicUsize,
    pub resource_calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl DiscoveryInterface for FakeDiscovery {
    async fn server_groups(&self) -> Result<APIGroupList> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(KubeError::Discovery("connection refused".to_string()));
        }
        Ok(APIGroupList {
            groups: self.groups.clone(),
        })
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(KubeError::Discovery("connection refused".to_string()));
        }
        self.resources
            .get(group_version)
            .cloned()
            .ok_or_else(|| KubeError::Discovery(format!("{group_version} not found")))
    }

    async fn server_version(&self) -> Result<Info> {
        Ok(Info {
            git_version: "v1.32.0".to_string(),
            ..Default::default()
        })
    }

    async fn openapi_schema(&self) -> Result<serde_json::Value> {
        Ok(json!({ "swagger": "2.0" }))
    }
}

fn group(name: &str, version: &str) -> APIGroup {
    let group_version = if name.is_empty() {
        version.to_string()
    } else {
        format!("{name}/{version}")
    };
    let version = GroupVersionForDiscovery {
        group_version,
        version: version.to_string(),
    };
    APIGroup {
        name: name.to_string(),
        preferred_version: Some(version.clone()),
        server_address_by_client_cidrs: None,
        versions: vec![version],
    }
}

fn resource_list(group_version: &str, resources: &[(&str, &str)]) -> APIResourceList {
    APIResourceList {
        group_version: group_version.to_string(),
        resources: resources
            .iter()
            .map(|(name, kind)| APIResource {
                name: name.to_string(),
                kind: kind.to_string(),
                namespaced: true,
                singular_name: String::new(),
                verbs: vec!["get".to_string(), "list".to_string()],
                ..Default::default()
            })
            .collect(),
    }
}

/// A cluster serving the core, apps and networking groups.
pub fn standard_discovery() -> FakeDiscovery {
    FakeDiscovery {
        groups: vec![
            group("", "v1"),
            group("apps", "v1"),
            group("networking.k8s.io", "v1"),
        ],
        resources: HashMap::from([
            (
                "v1".to_string(),
                resource_list("v1", &[("services", "Service"), ("pods", "Pod")]),
            ),
            (
                "apps/v1".to_string(),
                resource_list(
                    "apps/v1",
                    &[
                        ("daemonsets", "DaemonSet"),
                        ("deployments", "Deployment"),
                        ("deployments/scale", "Scale"),
                        ("replicasets", "ReplicaSet"),
                        ("statefulsets", "StatefulSet"),
                    ],
                ),
            ),
            (
                "networking.k8s.io/v1".to_string(),
                resource_list("networking.k8s.io/v1", &[("ingresses", "Ingress")]),
            ),
        ]),
        ..Default::default()
    }
}

pub fn gvr_for(kind: InfraKind) -> GroupVersionResource {
    let group = match kind {
        InfraKind::Service => "",
        InfraKind::Ingress => "networking.k8s.io",
        _ => "apps",
    };
    GroupVersionResource {
        group: group.to_string(),
        version: "v1".to_string(),
        resource: kind.resource().to_string(),
        kind: kind.kind().to_string(),
        namespaced: true,
    }
}

pub fn object(
    kind: &str,
    api_version: &str,
    name: &str,
    namespace: &str,
    labels: &[(&str, &str)],
    annotations: &[(&str, &str)],
) -> DynamicObject {
    let labels: HashMap<&str, &str> = labels.iter().copied().collect();
    let annotations: HashMap<&str, &str> = annotations.iter().copied().collect();
    serde_json::from_value(json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels,
            "annotations": annotations,
        },
        "spec": {},
    }))
    .unwrap()
}

#[derive(Debug, Clone)]
pub struct ListCall {
    pub resource: String,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

/// Serves objects per resource type, with per-kind failures and stalls.
#[derive(Default)]
pub struct FakeLister {
    objects: Mutex<HashMap<String, Vec<DynamicObject>>>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<ListCall>>,
}

impl FakeLister {
    pub fn add(&self, kind: InfraKind, object: DynamicObject) {
        self.objects
            .lock()
            .entry(kind.resource().to_string())
            .or_default()
            .push(object);
    }

    pub fn clear(&self) {
        self.objects.lock().clear();
    }

    pub fn fail(&self, kind: InfraKind) {
        self.failing.lock().insert(kind.resource().to_string());
    }

    pub fn stall(&self, kind: InfraKind) {
        self.stalled.lock().insert(kind.resource().to_string());
    }
}

#[async_trait]
impl KindLister for FakeLister {
    async fn list_objects(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>> {
        self.calls.lock().push(ListCall {
            resource: gvr.resource.clone(),
            namespace: namespace.map(str::to_string),
            label_selector: params.label_selector.clone(),
            field_selector: params.field_selector.clone(),
        });

        let stalled = self.stalled.lock().contains(&gvr.resource);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let failing = self.failing.lock().contains(&gvr.resource);
        if failing {
            return Err(KubeError::Discovery(format!(
                "{} is forbidden",
                gvr.resource
            )));
        }

        let objects = self
            .objects
            .lock()
            .get(&gvr.resource)
            .cloned()
            .unwrap_or_default();
        Ok(objects
            .into_iter()
            .filter(|o| namespace.map_or(true, |ns| o.metadata.namespace.as_deref() == Some(ns)))
            .collect())
    }
}

/// Hands out sessions over one shared discovery cache and fake cluster.
pub struct FakeConnector {
    pub cache: Arc<DiscoveryCache>,
    pub discovery: Arc<FakeDiscovery>,
    pub lister: Arc<FakeLister>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(discovery: FakeDiscovery) -> Self {
        Self {
            cache: Arc::new(DiscoveryCache::new(Duration::from_secs(300))),
            discovery: Arc::new(discovery),
            lister: Arc::new(FakeLister::default()),
            connects: AtomicUsize::new(0),
        }
    }
}

impl ClusterConnector for FakeConnector {
    type Discovery = Arc<FakeDiscovery>;
    type Lister = FakeLister;

    fn connect(
        &self,
        provider: &ProviderConfig,
    ) -> Result<ClusterHandle<Arc<FakeDiscovery>, FakeLister>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ClusterHandle {
            discovery: self.cache.client(&provider.host, self.discovery.clone()),
            lister: self.lister.clone(),
            namespace: provider.namespace.clone(),
        })
    }
}

/// A `ResourceStore` over plain maps, with switches to fail the clear or
/// the insert step.
#[derive(Default)]
pub struct MemoryStore {
    pub providers: Mutex<Vec<ProviderConfig>>,
    pub resources: Mutex<Vec<Resource>>,
    pub fail_delete: AtomicBool,
    pub fail_create: AtomicBool,
}

impl MemoryStore {
    pub fn with_provider(provider: ProviderConfig) -> Self {
        let store = Self::default();
        store.providers.lock().push(provider);
        store
    }

    pub fn account_resources(&self, account_name: &str) -> Vec<Resource> {
        self.resources
            .lock()
            .iter()
            .filter(|r| r.account_name == account_name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn delete_resources_by_account(&self, account_name: &str) -> anyhow::Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("database is read only"));
        }
        self.resources
            .lock()
            .retain(|r| r.account_name != account_name);
        Ok(())
    }

    async fn create_resource(&self, resource: &Resource) -> anyhow::Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("duplicate key"));
        }
        self.resources.lock().push(resource.clone());
        Ok(())
    }

    async fn list_resources_by_task_id(&self, task_id: Uuid) -> anyhow::Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_provider(&self, account_name: &str) -> anyhow::Result<Option<ProviderConfig>> {
        Ok(self
            .providers
            .lock()
            .iter()
            .find(|p| p.name == account_name)
            .cloned())
    }

    async fn list_providers(&self) -> anyhow::Result<Vec<ProviderConfig>> {
        Ok(self.providers.lock().clone())
    }

    async fn list_resources_by_application(
        &self,
        application: &str,
    ) -> anyhow::Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .iter()
            .filter(|r| r.spinnaker_app == application)
            .cloned()
            .collect())
    }
}

pub fn provider(name: &str, namespace: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        host: format!("https://{name}.example.com"),
        ca_data: String::new(),
        bearer_token: String::new().into(),
        namespace: namespace.map(str::to_string),
    }
}
