use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub org_id: Option<String>,
    pub physical_sign: Option<String>,
    pub event_type: Option<String>,
    pub level: String,
    pub threshold_min: Option<f64>,
    pub threshold_max: Option<f64>,
    pub auto_process_enabled: bool,
    pub auto_process_action: String,
    pub auto_process_delay_secs: i64,
    pub auto_resolve_threshold_count: i64,
    pub suppress_duration_mins: i64,
    pub time_window_secs: i64,
    pub enabled: bool,
    pub source: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
