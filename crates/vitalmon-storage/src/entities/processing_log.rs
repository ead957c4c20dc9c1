use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "processing_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub instance_id: String,
    pub rule_id: String,
    pub tenant_id: String,
    pub dedup_key: String,
    pub from_state: Option<String>,
    pub to_state: String,
    pub action: Option<String>,
    pub actor: String,
    pub outcome: String,
    pub error: Option<String>,
    pub event_json: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
