use std::time::Duration;

use async_trait::async_trait;
use kube::{
    api::{Api, DynamicObject, ListParams},
    core::TypeMeta,
};
use kubecd_common::kube::MANAGED_BY_LABEL_SELECTOR;

use crate::{
    discovery::GroupVersionResource,
    error::{KubeError, Result},
};

/// Lists objects of one resource type.
#[async_trait]
pub trait KindLister: Send + Sync {
    async fn list_objects(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>>;
}

#[async_trait]
impl KindLister for kube::Client {
    async fn list_objects(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<Vec<DynamicObject>> {
        let api_resource = gvr.api_resource();
        let api: Api<DynamicObject> = match namespace {
            Some(ns) if gvr.namespaced => Api::namespaced_with(self.clone(), ns, &api_resource),
            _ => Api::all_with(self.clone(), &api_resource),
        };
        Ok(api.list(params).await?.items)
    }
}

/// The list parameters for one kind: the managed-by selector, plus a
/// namespace field selector for namespace scoped accounts.
pub fn list_params(namespace: Option<&str>, timeout: Duration) -> ListParams {
    let mut params = ListParams::default()
        .labels(MANAGED_BY_LABEL_SELECTOR)
        .timeout(u32::try_from(timeout.as_secs().max(1)).unwrap_or(u32::MAX));
    if let Some(ns) = namespace {
        params = params.fields(&format!("metadata.namespace={ns}"));
    }
    params
}

/// Lists the managed objects of `gvr`, bounded by `timeout`.
///
/// Items of a list response carry no type information, it is filled in
/// from `gvr` so callers can tell objects of different kinds apart.
pub async fn list_kind<L: KindLister + ?Sized>(
    lister: &L,
    gvr: &GroupVersionResource,
    namespace: Option<&str>,
    timeout: Duration,
) -> Result<Vec<DynamicObject>> {
    let params = list_params(namespace, timeout);
    let objects = tokio::time::timeout(timeout, lister.list_objects(gvr, namespace, &params))
        .await
        .map_err(|_| KubeError::Timeout(timeout))??;

    Ok(objects
        .into_iter()
        .map(|mut object| {
            if object.types.as_ref().map_or(true, |t| t.kind.is_empty()) {
                object.types = Some(TypeMeta {
                    api_version: gvr.api_version(),
                    kind: gvr.kind.clone(),
                });
            }
            object
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kubecd_common::InfraKind;

    use super::*;
    use crate::testing::{gvr_for, object, FakeLister};

    #[tokio::test]
    async fn test_list_kind_applies_selectors() {
        let lister = FakeLister::default();
        lister.add(
            InfraKind::Deployment,
            object("Deployment", "apps/v1", "web", "team-a", &[], &[]),
        );

        let gvr = gvr_for(InfraKind::Deployment);
        let objects = list_kind(&lister, &gvr, Some("team-a"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);

        let calls = lister.calls.lock();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.namespace.as_deref(), Some("team-a"));
        assert_eq!(call.label_selector.as_deref(), Some(MANAGED_BY_LABEL_SELECTOR));
        assert_eq!(
            call.field_selector.as_deref(),
            Some("metadata.namespace=team-a")
        );
    }

    #[tokio::test]
    async fn test_list_kind_cluster_wide_without_namespace() {
        let lister = FakeLister::default();
        let gvr = gvr_for(InfraKind::Service);
        list_kind(&lister, &gvr, None, Duration::from_secs(10))
            .await
            .unwrap();

        let calls = lister.calls.lock();
        assert_eq!(calls[0].namespace, None);
        assert_eq!(calls[0].field_selector, None);
    }

    #[test]
    fn test_list_params_timeout_saturates() {
        assert_eq!(list_params(None, Duration::from_millis(200)).timeout, Some(1));
        assert_eq!(list_params(None, Duration::from_secs(10)).timeout, Some(10));
        let huge = Duration::from_secs(u64::from(u32::MAX) + 5);
        assert_eq!(list_params(None, huge).timeout, Some(u32::MAX));
    }

    #[tokio::test]
    async fn test_list_kind_fills_missing_type_meta() {
        let lister = FakeLister::default();
        let mut untyped = object("ReplicaSet", "apps/v1", "web-v001", "default", &[], &[]);
        untyped.types = None;
        lister.add(InfraKind::ReplicaSet, untyped);

        let gvr = gvr_for(InfraKind::ReplicaSet);
        let objects = list_kind(&lister, &gvr, None, Duration::from_secs(10))
            .await
            .unwrap();
        let types = objects[0].types.as_ref().unwrap();
        assert_eq!(types.kind, "ReplicaSet");
        assert_eq!(types.api_version, "apps/v1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_kind_times_out() {
        let lister = Arc::new(FakeLister::default());
        lister.stall(InfraKind::Ingress);

        let gvr = gvr_for(InfraKind::Ingress);
        let result = list_kind(lister.as_ref(), &gvr, None, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(KubeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_list_kind_propagates_errors() {
        let lister = FakeLister::default();
        lister.fail(InfraKind::Service);

        let gvr = gvr_for(InfraKind::Service);
        assert!(list_kind(&lister, &gvr, None, Duration::from_secs(10))
            .await
            .is_err());
    }
}
