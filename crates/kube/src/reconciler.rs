use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use kube::{api::DynamicObject, ResourceExt};
use kubecd_common::{
    kube::{
        DEFAULT_ACCOUNT_TIMEOUT_SECS, DEFAULT_LIST_TIMEOUT_SECS, DEFAULT_RESOURCE_CHANNEL_CAPACITY,
    },
    InfraKind, Resource, ResourceStore,
};
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    client::ClusterConnector,
    discovery::ServerResources,
    error::{KubeError, Result},
    lister::list_kind,
    names,
};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Bound on listing a single kind.
    pub list_timeout: Duration,
    /// Bound on a whole pass for one account.
    pub account_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            list_timeout: Duration::from_secs(DEFAULT_LIST_TIMEOUT_SECS),
            account_timeout: Duration::from_secs(DEFAULT_ACCOUNT_TIMEOUT_SECS),
            channel_capacity: DEFAULT_RESOURCE_CHANNEL_CAPACITY,
        }
    }
}

/// One async mutex per account, so passes for the same account never
/// interleave while different accounts run in parallel.
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountLocks {
    pub fn lock_for(&self, account_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(account_name.to_string())
            .or_default()
            .clone()
    }
}

/// Rebuilds the stored resource snapshot of an account from what is
/// live in its cluster.
pub struct ResourceReconciler<C> {
    connector: Arc<C>,
    store: Arc<dyn ResourceStore>,
    locks: AccountLocks,
    options: ReconcileOptions,
}

impl<C: ClusterConnector> ResourceReconciler<C> {
    pub fn new(connector: Arc<C>, store: Arc<dyn ResourceStore>, options: ReconcileOptions) -> Self {
        Self {
            connector,
            store,
            locks: AccountLocks::default(),
            options,
        }
    }

    /// Runs one pass for `account_name` and returns the new snapshot.
    ///
    /// Either the whole snapshot is written or the first fatal error is
    /// returned. A kind that fails to list only shows up in the logs.
    pub async fn reconcile(&self, account_name: &str) -> Result<Vec<Resource>> {
        let lock = self.locks.lock_for(account_name);
        let _guard = lock.lock().await;

        let timeout = self.options.account_timeout;
        match tokio::time::timeout(timeout, self.run_pass(account_name)).await {
            Ok(Ok(resources)) => {
                info!(
                    account = account_name,
                    count = resources.len(),
                    "reconciled kubernetes resources"
                );
                Ok(resources)
            }
            Ok(Err(e)) => {
                error!(account = account_name, "reconcile failed: {e}");
                Err(e)
            }
            Err(_) => {
                error!(account = account_name, "reconcile timed out after {timeout:?}");
                Err(KubeError::Timeout(timeout))
            }
        }
    }

    /// Reconciles every configured provider, at most `concurrency` at a
    /// time, and returns the outcome per account.
    pub async fn reconcile_all(
        &self,
        concurrency: usize,
    ) -> Result<Vec<(String, Result<usize>)>> {
        let providers = self.store.list_providers().await.map_err(KubeError::Store)?;
        let outcomes: Vec<_> = stream::iter(providers)
            .map(|provider| async move {
                let outcome = self
                    .reconcile(&provider.name)
                    .await
                    .map(|resources| resources.len());
                (provider.name, outcome)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        Ok(outcomes)
    }

    async fn run_pass(&self, account_name: &str) -> Result<Vec<Resource>> {
        let provider = self
            .store
            .get_provider(account_name)
            .await
            .map_err(KubeError::Store)?
            .ok_or_else(|| KubeError::ProviderNotFound(account_name.to_string()))?;
        let cluster = self.connector.connect(&provider)?;

        debug!(account = account_name, "discovering");
        let server_resources = ServerResources::discover(&cluster.discovery).await?;

        debug!(account = account_name, "listing");
        let (tx, mut rx) = mpsc::channel::<DynamicObject>(self.options.channel_capacity.max(1));
        // dropping the set aborts producers still running when the pass
        // is abandoned
        let mut producers = JoinSet::new();
        for kind in InfraKind::all() {
            let tx = tx.clone();
            let lister = cluster.lister.clone();
            let namespace = cluster.namespace.clone();
            let gvr = server_resources.resolve(None, kind.kind()).cloned();
            let account = account_name.to_string();
            let list_timeout = self.options.list_timeout;
            producers.spawn(async move {
                let Some(gvr) = gvr else {
                    warn!(account = %account, %kind, "kind is not served by the cluster");
                    return;
                };
                match list_kind(lister.as_ref(), &gvr, namespace.as_deref(), list_timeout).await {
                    Ok(objects) => {
                        for object in objects {
                            if tx.send(object).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(account = %account, %kind, "error listing kind, skipping it: {e}");
                    }
                }
            });
        }
        drop(tx);

        let task_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let mut resources = Vec::new();
        while let Some(object) = rx.recv().await {
            resources.push(to_resource(
                account_name,
                task_id,
                timestamp,
                &object,
                &server_resources,
            )?);
        }
        while let Some(joined) = producers.join_next().await {
            if let Err(e) = joined {
                warn!(account = account_name, "list task failed: {e}");
            }
        }

        debug!(account = account_name, count = resources.len(), "clearing and writing");
        self.store
            .replace_resources(account_name, &resources)
            .await
            .map_err(KubeError::Store)?;

        self.store
            .list_resources_by_task_id(task_id)
            .await
            .map_err(KubeError::Store)
    }
}

/// The stored record of a live object.
pub fn to_resource(
    account_name: &str,
    task_id: Uuid,
    timestamp: DateTime<Utc>,
    object: &DynamicObject,
    server_resources: &ServerResources,
) -> Result<Resource> {
    let types = object.types.as_ref();
    let kind = types.map(|t| t.kind.as_str()).unwrap_or_default();
    let gvr = server_resources
        .resolve(types.map(|t| t.api_version.as_str()), kind)
        .ok_or_else(|| KubeError::UnknownKind(kind.to_string()))?;

    let name = object.name_any();
    let artifact_name = names::artifact_name(&name);
    Ok(Resource {
        account_name: account_name.to_string(),
        id: Uuid::new_v4(),
        task_id,
        timestamp,
        api_group: gvr.group.clone(),
        version: gvr.version.clone(),
        resource: gvr.resource.clone(),
        kind: gvr.kind.clone(),
        cluster: names::cluster_key(&gvr.kind, &artifact_name),
        spinnaker_app: names::application(object.annotations(), object.labels()),
        namespace: object.namespace().unwrap_or_default(),
        name,
        artifact_name,
        task_type: None,
    })
}
