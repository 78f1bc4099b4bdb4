use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Server-side selector applied to every list call, so only objects
/// deployed through the pipeline are fetched.
pub const MANAGED_BY_LABEL_SELECTOR: &str =
    "app.kubernetes.io/managed-by in (spinnaker,spinnaker-clouddriver)";
pub const MONIKER_APPLICATION_ANNOTATION: &str = "moniker.spinnaker.io/application";
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Cache key of the API group catalog in the discovery cache.
pub const SERVER_GROUPS_CACHE_KEY: &str = "servergroups";

pub const DEFAULT_DISCOVERY_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ACCOUNT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RESOURCE_CHANNEL_CAPACITY: usize = 1000;

/// The fixed set of object kinds tracked for the cluster and load
/// balancer views.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
pub enum InfraKind {
    DaemonSet,
    Deployment,
    Ingress,
    ReplicaSet,
    Service,
    StatefulSet,
}

impl InfraKind {
    pub fn all() -> impl Iterator<Item = InfraKind> {
        <InfraKind as strum::IntoEnumIterator>::iter()
    }

    /// The Kubernetes `Kind`, e.g. `Deployment`.
    pub fn kind(&self) -> &'static str {
        match self {
            InfraKind::DaemonSet => "DaemonSet",
            InfraKind::Deployment => "Deployment",
            InfraKind::Ingress => "Ingress",
            InfraKind::ReplicaSet => "ReplicaSet",
            InfraKind::Service => "Service",
            InfraKind::StatefulSet => "StatefulSet",
        }
    }

    /// The plural resource name used in API paths, e.g. `deployments`.
    pub fn resource(&self) -> &'static str {
        match self {
            InfraKind::DaemonSet => "daemonsets",
            InfraKind::Deployment => "deployments",
            InfraKind::Ingress => "ingresses",
            InfraKind::ReplicaSet => "replicasets",
            InfraKind::Service => "services",
            InfraKind::StatefulSet => "statefulsets",
        }
    }

    pub fn from_kind(kind: &str) -> Option<InfraKind> {
        InfraKind::all().find(|k| k.kind().eq_ignore_ascii_case(kind))
    }

    /// Kinds that make up a server group, as opposed to a load balancer.
    pub fn is_workload(&self) -> bool {
        matches!(
            self,
            InfraKind::DaemonSet
                | InfraKind::Deployment
                | InfraKind::ReplicaSet
                | InfraKind::StatefulSet
        )
    }

    pub fn is_load_balancer(&self) -> bool {
        matches!(self, InfraKind::Ingress | InfraKind::Service)
    }
}

/// One persisted row per live Kubernetes object of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub account_name: String,
    pub id: Uuid,
    #[serde(rename = "taskID")]
    pub task_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub api_group: String,
    pub name: String,
    pub artifact_name: String,
    pub namespace: String,
    /// Plural resource name, e.g. `deployments`.
    pub resource: String,
    pub version: String,
    pub kind: String,
    pub spinnaker_app: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
}

impl Resource {
    /// Whether two rows describe the same object, ignoring the fields
    /// that change on every pass.
    pub fn same_object(&self, other: &Resource) -> bool {
        self.account_name == other.account_name
            && self.api_group == other.api_group
            && self.version == other.version
            && self.resource == other.resource
            && self.kind == other.kind
            && self.name == other.name
            && self.artifact_name == other.artifact_name
            && self.namespace == other.namespace
            && self.cluster == other.cluster
            && self.spinnaker_app == other.spinnaker_app
    }
}

/// A configured target cluster and the credentials used to reach it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    pub host: String,
    /// Base64 encoded PEM bundle of the cluster CA.
    #[serde(default)]
    pub ca_data: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub bearer_token: SecretString,
    /// When set, the account only sees this namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
