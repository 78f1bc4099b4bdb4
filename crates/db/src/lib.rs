pub mod api;

pub mod tests {
    use anyhow::Result;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use crate::api::DbApi;
    use kubecd_db_migration::Migrator;

    /// A migrated in-memory database. Needs sea-orm's `sqlx-sqlite`
    /// feature.
    pub async fn prepare_db() -> Result<DbApi> {
        let conn = Database::connect("sqlite::memory:").await?;
        let db = DbApi { conn, pool: None };
        Migrator::up(&db.conn, None).await?;
        Ok(db)
    }
}
