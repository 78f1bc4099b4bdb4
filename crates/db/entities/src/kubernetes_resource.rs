use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "kubernetes_resource")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_name: String,
    pub task_id: Uuid,
    pub timestamp: DateTimeWithTimeZone,
    pub api_group: String,
    pub name: String,
    pub artifact_name: String,
    pub namespace: String,
    pub resource: String,
    pub version: String,
    pub kind: String,
    pub spinnaker_app: String,
    pub cluster: String,
    pub task_type: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
