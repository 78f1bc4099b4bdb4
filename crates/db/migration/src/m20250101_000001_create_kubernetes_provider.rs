use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KubernetesProvider::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KubernetesProvider::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(KubernetesProvider::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KubernetesProvider::DeletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(KubernetesProvider::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(KubernetesProvider::Host).string().not_null())
                    .col(ColumnDef::new(KubernetesProvider::CaData).text().not_null())
                    .col(ColumnDef::new(KubernetesProvider::BearerToken).text().not_null())
                    .col(ColumnDef::new(KubernetesProvider::Namespace).string())
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum KubernetesProvider {
    Table,
    Id,
    CreatedAt,
    DeletedAt,
    Name,
    Host,
    CaData,
    BearerToken,
    Namespace,
}
