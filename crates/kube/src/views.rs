use std::collections::{BTreeMap, BTreeSet};

use kubecd_common::{InfraKind, Resource, ResourceStore};
use serde::Serialize;

use crate::{
    error::{KubeError, Result},
    names,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroupSummary {
    pub account_name: String,
    pub namespace: String,
    pub cluster: String,
    pub name: String,
    pub kind: String,
}

async fn application_resources(store: &dyn ResourceStore, application: &str) -> Result<Vec<Resource>> {
    store
        .list_resources_by_application(application)
        .await
        .map_err(KubeError::Store)
}

fn infra_kind(resource: &Resource) -> Option<InfraKind> {
    InfraKind::from_kind(&resource.kind)
}

/// Cluster keys of an application's workloads, per account.
pub async fn application_clusters(
    store: &dyn ResourceStore,
    application: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let mut clusters: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for resource in application_resources(store, application).await? {
        if infra_kind(&resource).is_some_and(|k| k.is_workload()) {
            clusters
                .entry(resource.account_name)
                .or_default()
                .insert(resource.cluster);
        }
    }
    Ok(clusters)
}

/// Services and ingresses of an application, per account, named
/// `"<kind> <name>"` with the kind's first letter lowercased.
pub async fn application_load_balancers(
    store: &dyn ResourceStore,
    application: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let mut load_balancers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for resource in application_resources(store, application).await? {
        if infra_kind(&resource).is_some_and(|k| k.is_load_balancer()) {
            load_balancers
                .entry(resource.account_name)
                .or_default()
                .insert(format!("{} {}", names::lower_first(&resource.kind), resource.name));
        }
    }
    Ok(load_balancers)
}

/// The versioned workloads of an application.
pub async fn application_server_groups(
    store: &dyn ResourceStore,
    application: &str,
) -> Result<Vec<ServerGroupSummary>> {
    let mut server_groups: Vec<ServerGroupSummary> = application_resources(store, application)
        .await?
        .into_iter()
        .filter(|r| {
            matches!(
                infra_kind(r),
                Some(InfraKind::ReplicaSet | InfraKind::StatefulSet | InfraKind::DaemonSet)
            )
        })
        .map(|r| ServerGroupSummary {
            account_name: r.account_name,
            namespace: r.namespace,
            cluster: r.cluster,
            name: r.name,
            kind: r.kind,
        })
        .collect();
    server_groups.sort_by(|a, b| {
        (&a.account_name, &a.namespace, &a.name).cmp(&(&b.account_name, &b.namespace, &b.name))
    });
    Ok(server_groups)
}
