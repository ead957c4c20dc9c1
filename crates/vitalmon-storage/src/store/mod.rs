use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::error::Result;

pub mod instance;
pub mod log;
pub mod rule;
pub mod timer;

// ---- 公开 Row / Filter 类型（从各子模块重新导出）----
pub use instance::{AlertInstanceFilter, AlertInstanceRow};
pub use log::{ProcessingLogFilter, ProcessingLogRow};
pub use rule::{AlertRuleFilter, AlertRuleUpdate};
pub use timer::PendingTimerRow;

/// 处理引擎数据库（vitalmon.db）的统一访问层。
///
/// 所有方法均为 `async fn`，底层使用 SeaORM + SQLite。
/// 规则、告警实例、处理日志、待触发定时器都存放在同一个库中，
/// 定时器表即为持久化的延迟处理队列。
pub struct ProcessStore {
    pub(crate) db: DatabaseConnection,
}

impl ProcessStore {
    /// 连接并初始化数据库。
    ///
    /// - `db_url`：完整的数据库连接 URL，由调用方（服务器配置）提供。
    ///   SQLite 示例：`sqlite://data/vitalmon.db?mode=rwc`
    ///
    /// 自动运行 `sea-orm-migration` 迁移，确保 Schema 最新。
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %db_url, "Initialized process store (SeaORM)");
        Ok(Self { db })
    }

    /// 以显式连接配置初始化（测试中用于限制连接数等场景）。
    pub async fn with_options(options: ConnectOptions) -> Result<Self> {
        let db = Database::connect(options).await?;
        db.execute_unprepared("PRAGMA journal_mode=WAL;").await.ok();
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }

    /// 返回底层数据库连接引用（供子模块使用）。
    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
