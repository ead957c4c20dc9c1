use serde::{Deserialize, Serialize};
use vitalmon_engine::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// CORS 允许的 origins 列表，为空时允许所有来源（开发模式）
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub statistics: StatisticsSection,
    /// 通知渠道绑定列表
    #[serde(default)]
    pub notification: Vec<ChannelSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            cors_allowed_origins: Vec::new(),
            database: DatabaseConfig::default(),
            engine: EngineSection::default(),
            statistics: StatisticsSection::default(),
            notification: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// 完整数据库连接 URL；为空时使用 data_dir 下的 SQLite 文件
    #[serde(default)]
    pub url: Option<String>,
}

impl DatabaseConfig {
    pub fn connection_url(&self, data_dir: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{data_dir}/vitalmon.db?mode=rwc"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_timer_batch")]
    pub timer_batch: usize,
    /// 告警实例最长存活时间（秒），超时未关闭的实例会被置为 expired
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_action_max_retries")]
    pub action_max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            tick_secs: default_tick_secs(),
            timer_batch: default_timer_batch(),
            max_lifetime_secs: default_max_lifetime_secs(),
            action_max_retries: default_action_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            shards: self.shards,
            tick_secs: self.tick_secs,
            timer_batch: self.timer_batch,
            max_lifetime_secs: self.max_lifetime_secs,
            action_max_retries: self.action_max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSection {
    /// 统计快照重算间隔（秒）
    #[serde(default = "default_recompute_secs")]
    pub recompute_secs: u64,
    /// 统计窗口（小时）
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl Default for StatisticsSection {
    fn default() -> Self {
        Self {
            recompute_secs: default_recompute_secs(),
            window_hours: default_window_hours(),
        }
    }
}

/// 通知渠道配置（启动时通过插件注册表实例化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSeed {
    /// 渠道类型（webhook / sms）
    pub channel_type: String,
    /// 最低告警级别
    #[serde(default = "default_min_severity")]
    pub min_severity: String,
    /// 收件人列表（webhook URL / 手机号）
    #[serde(default)]
    pub recipients: Vec<String>,
    /// 渠道配置
    #[serde(default = "default_channel_config")]
    pub config: serde_json::Value,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_shards() -> usize {
    16
}

fn default_tick_secs() -> u64 {
    1
}

fn default_timer_batch() -> usize {
    64
}

fn default_max_lifetime_secs() -> u64 {
    86400
}

fn default_action_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_recompute_secs() -> u64 {
    60
}

fn default_window_hours() -> i64 {
    24
}

fn default_min_severity() -> String {
    "low".to_string()
}

fn default_channel_config() -> serde_json::Value {
    serde_json::json!({})
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
