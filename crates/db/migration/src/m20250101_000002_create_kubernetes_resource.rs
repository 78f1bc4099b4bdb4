use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KubernetesResource::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KubernetesResource::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(KubernetesResource::AccountName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KubernetesResource::TaskId).uuid().not_null())
                    .col(
                        ColumnDef::new(KubernetesResource::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KubernetesResource::ApiGroup).string().not_null())
                    .col(ColumnDef::new(KubernetesResource::Name).string().not_null())
                    .col(
                        ColumnDef::new(KubernetesResource::ArtifactName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KubernetesResource::Namespace).string().not_null())
                    .col(ColumnDef::new(KubernetesResource::Resource).string().not_null())
                    .col(ColumnDef::new(KubernetesResource::Version).string().not_null())
                    .col(ColumnDef::new(KubernetesResource::Kind).string().not_null())
                    .col(
                        ColumnDef::new(KubernetesResource::SpinnakerApp)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KubernetesResource::Cluster).string().not_null())
                    .col(ColumnDef::new(KubernetesResource::TaskType).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kubernetes_resource_account_name_idx")
                    .table(KubernetesResource::Table)
                    .col(KubernetesResource::AccountName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kubernetes_resource_task_id_idx")
                    .table(KubernetesResource::Table)
                    .col(KubernetesResource::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kubernetes_resource_spinnaker_app_idx")
                    .table(KubernetesResource::Table)
                    .col(KubernetesResource::SpinnakerApp)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum KubernetesResource {
    Table,
    Id,
    AccountName,
    TaskId,
    Timestamp,
    ApiGroup,
    Name,
    ArtifactName,
    Namespace,
    Resource,
    Version,
    Kind,
    SpinnakerApp,
    Cluster,
    TaskType,
}
