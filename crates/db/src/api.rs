use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use kubecd_common::{ProviderConfig, Resource, ResourceStore};
use kubecd_db_entities::{kubernetes_provider, kubernetes_resource};
use kubecd_db_migration::Migrator;
use secrecy::ExposeSecret;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct DbApi {
    pub conn: DatabaseConnection,
    pub pool: Option<PgPool>,
}

async fn connect_db(conn_url: &str) -> Result<sqlx::PgPool> {
    let pool: sqlx::PgPool = sqlx::pool::PoolOptions::new()
        .max_connections(20)
        .connect(conn_url)
        .await?;
    Ok(pool)
}

impl DbApi {
    pub async fn new(conn_url: &str, no_migration: bool) -> Result<Self> {
        let pool = connect_db(conn_url)
            .await
            .context("connecting to the database")?;
        let conn = sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
        let db = DbApi {
            conn,
            pool: Some(pool),
        };
        if !no_migration {
            db.migrate().await?;
        }
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }

    /// Inserts the provider, or updates the one with the same name.
    pub async fn upsert_provider(&self, provider: &ProviderConfig) -> Result<()> {
        kubernetes_provider::Entity::insert(kubernetes_provider::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            created_at: ActiveValue::Set(Utc::now().into()),
            deleted_at: ActiveValue::Set(None),
            name: ActiveValue::Set(provider.name.clone()),
            host: ActiveValue::Set(provider.host.clone()),
            ca_data: ActiveValue::Set(provider.ca_data.clone()),
            bearer_token: ActiveValue::Set(provider.bearer_token.expose_secret().to_string()),
            namespace: ActiveValue::Set(provider.namespace.clone()),
        })
        .on_conflict(
            OnConflict::column(kubernetes_provider::Column::Name)
                .update_columns([
                    kubernetes_provider::Column::Host,
                    kubernetes_provider::Column::CaData,
                    kubernetes_provider::Column::BearerToken,
                    kubernetes_provider::Column::Namespace,
                    kubernetes_provider::Column::DeletedAt,
                ])
                .to_owned(),
        )
        .exec(&self.conn)
        .await?;
        Ok(())
    }

    /// Soft deletes the provider. Its resources stay until removed with
    /// `delete_resources_by_account`.
    pub async fn delete_provider(&self, name: &str) -> Result<()> {
        kubernetes_provider::Entity::update_many()
            .col_expr(
                kubernetes_provider::Column::DeletedAt,
                sea_orm::sea_query::Expr::value(Some(
                    sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now()),
                )),
            )
            .filter(kubernetes_provider::Column::Name.eq(name))
            .filter(kubernetes_provider::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn list_resources_by_account(&self, account_name: &str) -> Result<Vec<Resource>> {
        let models = kubernetes_resource::Entity::find()
            .filter(kubernetes_resource::Column::AccountName.eq(account_name))
            .order_by_asc(kubernetes_resource::Column::Kind)
            .order_by_asc(kubernetes_resource::Column::Namespace)
            .order_by_asc(kubernetes_resource::Column::Name)
            .all(&self.conn)
            .await?;
        Ok(models.into_iter().map(resource_from_model).collect())
    }
}

fn resource_to_model(resource: &Resource) -> kubernetes_resource::ActiveModel {
    kubernetes_resource::ActiveModel {
        id: ActiveValue::Set(resource.id),
        account_name: ActiveValue::Set(resource.account_name.clone()),
        task_id: ActiveValue::Set(resource.task_id),
        timestamp: ActiveValue::Set(resource.timestamp.into()),
        api_group: ActiveValue::Set(resource.api_group.clone()),
        name: ActiveValue::Set(resource.name.clone()),
        artifact_name: ActiveValue::Set(resource.artifact_name.clone()),
        namespace: ActiveValue::Set(resource.namespace.clone()),
        resource: ActiveValue::Set(resource.resource.clone()),
        version: ActiveValue::Set(resource.version.clone()),
        kind: ActiveValue::Set(resource.kind.clone()),
        spinnaker_app: ActiveValue::Set(resource.spinnaker_app.clone()),
        cluster: ActiveValue::Set(resource.cluster.clone()),
        task_type: ActiveValue::Set(resource.task_type.clone()),
    }
}

fn resource_from_model(model: kubernetes_resource::Model) -> Resource {
    Resource {
        account_name: model.account_name,
        id: model.id,
        task_id: model.task_id,
        timestamp: model.timestamp.with_timezone(&Utc),
        api_group: model.api_group,
        name: model.name,
        artifact_name: model.artifact_name,
        namespace: model.namespace,
        resource: model.resource,
        version: model.version,
        kind: model.kind,
        spinnaker_app: model.spinnaker_app,
        cluster: model.cluster,
        task_type: model.task_type,
    }
}

fn provider_from_model(model: kubernetes_provider::Model) -> ProviderConfig {
    ProviderConfig {
        name: model.name,
        host: model.host,
        ca_data: model.ca_data,
        bearer_token: model.bearer_token.into(),
        namespace: model.namespace,
    }
}

async fn delete_account_resources<C: ConnectionTrait>(conn: &C, account_name: &str) -> Result<u64> {
    let result = kubernetes_resource::Entity::delete_many()
        .filter(kubernetes_resource::Column::AccountName.eq(account_name))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[async_trait]
impl ResourceStore for DbApi {
    async fn delete_resources_by_account(&self, account_name: &str) -> Result<()> {
        delete_account_resources(&self.conn, account_name).await?;
        Ok(())
    }

    async fn create_resource(&self, resource: &Resource) -> Result<()> {
        resource_to_model(resource).insert(&self.conn).await?;
        Ok(())
    }

    async fn list_resources_by_task_id(&self, task_id: Uuid) -> Result<Vec<Resource>> {
        let models = kubernetes_resource::Entity::find()
            .filter(kubernetes_resource::Column::TaskId.eq(task_id))
            .order_by_asc(kubernetes_resource::Column::Kind)
            .order_by_asc(kubernetes_resource::Column::Namespace)
            .order_by_asc(kubernetes_resource::Column::Name)
            .all(&self.conn)
            .await?;
        Ok(models.into_iter().map(resource_from_model).collect())
    }

    async fn get_provider(&self, account_name: &str) -> Result<Option<ProviderConfig>> {
        let model = kubernetes_provider::Entity::find()
            .filter(kubernetes_provider::Column::Name.eq(account_name))
            .filter(kubernetes_provider::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(model.map(provider_from_model))
    }

    async fn list_providers(&self) -> Result<Vec<ProviderConfig>> {
        let models = kubernetes_provider::Entity::find()
            .filter(kubernetes_provider::Column::DeletedAt.is_null())
            .order_by_asc(kubernetes_provider::Column::Name)
            .all(&self.conn)
            .await?;
        Ok(models.into_iter().map(provider_from_model).collect())
    }

    async fn list_resources_by_application(&self, application: &str) -> Result<Vec<Resource>> {
        let models = kubernetes_resource::Entity::find()
            .filter(kubernetes_resource::Column::SpinnakerApp.eq(application))
            .order_by_asc(kubernetes_resource::Column::AccountName)
            .order_by_asc(kubernetes_resource::Column::Name)
            .all(&self.conn)
            .await?;
        Ok(models.into_iter().map(resource_from_model).collect())
    }

    async fn replace_resources(&self, account_name: &str, resources: &[Resource]) -> Result<()> {
        let txn = self.conn.begin().await?;
        let deleted = delete_account_resources(&txn, account_name).await?;
        for resource in resources {
            resource_to_model(resource).insert(&txn).await?;
        }
        txn.commit().await?;
        debug!(
            account = account_name,
            deleted,
            inserted = resources.len(),
            "replaced account resources"
        );
        Ok(())
    }
}
