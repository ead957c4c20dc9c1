use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use vitalmon_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Explicit priority table used to break matching ties:
    /// critical wins over high, high over medium, medium over low.
    pub fn priority(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Automatic action configured on an alert rule.
///
/// A closed set so an unknown action is a validation-time error instead of
/// a silent no-op at dispatch time.
///
/// # Examples
///
/// ```
/// use vitalmon_common::types::AlertAction;
///
/// let action: AlertAction = "auto_resolve".parse().unwrap();
/// assert_eq!(action, AlertAction::AutoResolve);
/// assert_eq!(action.to_string(), "auto_resolve");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Notify,
    Escalate,
    AutoResolve,
    Ignore,
}

impl std::fmt::Display for AlertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertAction::Notify => write!(f, "notify"),
            AlertAction::Escalate => write!(f, "escalate"),
            AlertAction::AutoResolve => write!(f, "auto_resolve"),
            AlertAction::Ignore => write!(f, "ignore"),
        }
    }
}

impl std::str::FromStr for AlertAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "notify" => Ok(AlertAction::Notify),
            "escalate" => Ok(AlertAction::Escalate),
            "auto_resolve" | "auto-resolve" => Ok(AlertAction::AutoResolve),
            "ignore" => Ok(AlertAction::Ignore),
            _ => Err(format!("unknown alert action: {s}")),
        }
    }
}

/// Lifecycle state of an alert instance.
///
/// `Resolved`, `Expired` and `Suppressed` are terminal. A processed or
/// escalated instance may still move to `Resolved` but never back to
/// `New`/`Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    New,
    Scheduled,
    Processed,
    Escalated,
    Resolved,
    Expired,
    Suppressed,
}

impl AlertState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AlertState::Resolved | AlertState::Expired | AlertState::Suppressed
        )
    }

    /// The instance is still the live correlation target for its dedup key.
    pub fn is_open(self) -> bool {
        matches!(self, AlertState::New | AlertState::Scheduled)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::New => write!(f, "new"),
            AlertState::Scheduled => write!(f, "scheduled"),
            AlertState::Processed => write!(f, "processed"),
            AlertState::Escalated => write!(f, "escalated"),
            AlertState::Resolved => write!(f, "resolved"),
            AlertState::Expired => write!(f, "expired"),
            AlertState::Suppressed => write!(f, "suppressed"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(AlertState::New),
            "scheduled" => Ok(AlertState::Scheduled),
            "processed" => Ok(AlertState::Processed),
            "escalated" => Ok(AlertState::Escalated),
            "resolved" => Ok(AlertState::Resolved),
            "expired" => Ok(AlertState::Expired),
            "suppressed" => Ok(AlertState::Suppressed),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

/// 穿戴设备上报事件（体征读数或设备事件）
///
/// `physical_sign` 与 `event_type` 至少填写一个，否则在接入层被拒绝。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VitalEvent {
    /// 事件唯一标识
    pub id: String,
    /// 租户标识
    pub tenant_id: String,
    /// 机构标识
    pub org_id: String,
    /// 设备唯一标识
    pub device_id: String,
    /// 体征类型（如 heart_rate / spo2 / blood_pressure_sys）
    pub physical_sign: Option<String>,
    /// 设备事件类型（如 fall_detected / sos_pressed / low_battery）
    pub event_type: Option<String>,
    /// 体征数值（设备事件可为空）
    pub value: Option<f64>,
    /// 设备事件附加载荷
    pub payload: Option<serde_json::Value>,
    /// 事件发生时间
    pub timestamp: DateTime<Utc>,
}

impl VitalEvent {
    /// The stream identity this event belongs to: the physical sign, or
    /// failing that the device event type.
    pub fn signal(&self) -> Option<&str> {
        self.physical_sign
            .as_deref()
            .or(self.event_type.as_deref())
    }
}

/// Identity tuple correlating events into one alert instance, and the
/// lookup key for suppression-window and auto-resolve state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub tenant_id: String,
    pub org_id: String,
    pub device_id: String,
    pub signal: String,
}

impl DedupKey {
    /// Derives the key from an event. `None` when the event names neither
    /// a physical sign nor an event type.
    pub fn from_event(event: &VitalEvent) -> Option<DedupKey> {
        let signal = event.signal()?.to_string();
        Some(DedupKey {
            tenant_id: event.tenant_id.clone(),
            org_id: event.org_id.clone(),
            device_id: event.device_id.clone(),
            signal,
        })
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.tenant_id, self.org_id, self.device_id, self.signal
        )
    }
}

/// 告警规则（领域模型，存储行在 vitalmon-storage 中定义）
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AlertRule {
    /// 规则唯一标识
    pub id: String,
    /// 规则名称
    pub name: String,
    /// 租户标识
    pub tenant_id: String,
    /// 机构标识（为空表示租户级规则）
    pub org_id: Option<String>,
    /// 体征类型
    pub physical_sign: Option<String>,
    /// 设备事件类型
    pub event_type: Option<String>,
    /// 告警级别
    pub level: Severity,
    /// 告警区间下界（数值落入 [min, max] 视为越限）
    pub threshold_min: Option<f64>,
    /// 告警区间上界
    pub threshold_max: Option<f64>,
    /// 是否启用自动处理
    pub auto_process_enabled: bool,
    /// 自动处理动作
    pub auto_process_action: AlertAction,
    /// 自动处理延迟（秒）
    pub auto_process_delay_secs: u64,
    /// 自动恢复所需连续正常读数次数（0 表示禁用自动恢复）
    pub auto_resolve_threshold_count: u32,
    /// 处理后抑制时长（分钟）
    pub suppress_duration_mins: u64,
    /// 去重时间窗口（秒）
    pub time_window_secs: u64,
    /// 是否启用
    pub enabled: bool,
    /// 来源（api / seed / import）
    pub source: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// The signal this rule watches.
    pub fn signal(&self) -> Option<&str> {
        self.physical_sign
            .as_deref()
            .or(self.event_type.as_deref())
    }

    /// Whether the event falls inside the rule's alerting band.
    ///
    /// Numeric readings breach when the value is within
    /// `[threshold_min, threshold_max]` (an unset bound is unbounded).
    /// Events without a numeric value breach when the rule is keyed on
    /// their event type. A reading outside the band is a normal reading
    /// for auto-resolve purposes.
    pub fn is_breaching(&self, event: &VitalEvent) -> bool {
        match event.value {
            Some(v) => {
                let above_min = self.threshold_min.map_or(true, |min| v >= min);
                let below_max = self.threshold_max.map_or(true, |max| v <= max);
                // A rule with no band at all on a numeric stream matches
                // every reading, which would make auto-resolve impossible;
                // such rules are meant for event-type streams.
                (self.threshold_min.is_some() || self.threshold_max.is_some())
                    && above_min
                    && below_max
            }
            None => {
                self.event_type.is_some() && self.event_type.as_deref() == event.event_type.as_deref()
            }
        }
    }
}

/// Outcome of a processed transition, recorded in the processing log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            _ => Err(format!("unknown outcome: {s}")),
        }
    }
}

/// 通知载荷（由 notify / escalate 动作投递到通知渠道）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotice {
    /// 告警实例标识
    pub instance_id: String,
    /// 规则标识
    pub rule_id: String,
    /// 规则名称
    pub rule_name: String,
    /// 租户标识
    pub tenant_id: String,
    /// 机构标识
    pub org_id: String,
    /// 设备标识
    pub device_id: String,
    /// 信号（体征或事件类型）
    pub signal: String,
    /// 告警级别
    pub level: Severity,
    /// 是否升级通知
    pub escalation: bool,
    /// 通知正文
    pub message: String,
    /// 触发值
    pub value: Option<f64>,
    /// 窗口内事件次数
    pub occurrence_count: i64,
    /// 告警创建时间
    pub created_at: DateTime<Utc>,
}
