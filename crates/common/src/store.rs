use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::kube::{ProviderConfig, Resource};

/// Persistence for providers and the per-account resource snapshot.
///
/// Rows of one account are only ever written by one reconciliation pass
/// at a time, callers serialize on the account name.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn delete_resources_by_account(&self, account_name: &str) -> Result<()>;

    async fn create_resource(&self, resource: &Resource) -> Result<()>;

    async fn list_resources_by_task_id(&self, task_id: Uuid) -> Result<Vec<Resource>>;

    /// `Ok(None)` when no provider with this name exists.
    async fn get_provider(&self, account_name: &str) -> Result<Option<ProviderConfig>>;

    async fn list_providers(&self) -> Result<Vec<ProviderConfig>>;

    async fn list_resources_by_application(&self, application: &str) -> Result<Vec<Resource>>;

    /// Replace the account's snapshot with `resources`.
    ///
    /// The default clears first and then inserts row by row, so a failed
    /// clear leaves the old snapshot in place but a failed insert leaves a
    /// partial one. Stores that can do better should override this.
    async fn replace_resources(&self, account_name: &str, resources: &[Resource]) -> Result<()> {
        self.delete_resources_by_account(account_name).await?;
        for resource in resources {
            self.create_resource(resource).await?;
        }
        Ok(())
    }
}
