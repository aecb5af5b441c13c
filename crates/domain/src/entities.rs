use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 调度类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleType {
    #[serde(rename = "CRON")]
    Cron,
    #[serde(rename = "FIXED_RATE")]
    FixedRate,
    #[serde(rename = "DAILY")]
    Daily,
    #[serde(rename = "WEEKLY")]
    Weekly,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Cron => "CRON",
            ScheduleType::FixedRate => "FIXED_RATE",
            ScheduleType::Daily => "DAILY",
            ScheduleType::Weekly => "WEEKLY",
        }
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRON" => Ok(ScheduleType::Cron),
            "FIXED_RATE" => Ok(ScheduleType::FixedRate),
            "DAILY" => Ok(ScheduleType::Daily),
            "WEEKLY" => Ok(ScheduleType::Weekly),
            _ => Err(format!("Invalid schedule type: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for ScheduleType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ScheduleType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<ScheduleType>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ScheduleType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 可复用的调度策略
///
/// `cron_expression` 由其余字段推导而来，每次创建或更新都会重新计算并持久化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleStrategy {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub schedule_type: ScheduleType,
    pub cron_expression: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub time_zone: Option<String>,
    pub interval_seconds: Option<i64>,
    pub days_of_week: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建或整体更新策略时的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    pub description: Option<String>,
    pub schedule_type: ScheduleType,
    /// 仅对 CRON 类型生效
    pub cron_expression: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub time_zone: Option<String>,
    pub interval_seconds: Option<i64>,
    #[serde(default)]
    pub days_of_week: Vec<String>,
}

impl ScheduleStrategy {
    /// 由输入构造策略，`cron_expression` 在解析前只保存调用方给出的原始值
    pub fn from_spec(spec: StrategySpec) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            name: spec.name,
            description: spec.description,
            schedule_type: spec.schedule_type,
            cron_expression: spec.cron_expression.unwrap_or_default(),
            start_time: spec.start_time,
            end_time: spec.end_time,
            time_zone: spec.time_zone,
            interval_seconds: spec.interval_seconds,
            days_of_week: spec.days_of_week,
            created_at: now,
            updated_at: now,
        }
    }

    /// 用输入整体覆盖可变字段
    pub fn apply_spec(&mut self, spec: StrategySpec) {
        self.name = spec.name;
        self.description = spec.description;
        self.schedule_type = spec.schedule_type;
        self.cron_expression = spec.cron_expression.unwrap_or_default();
        self.start_time = spec.start_time;
        self.end_time = spec.end_time;
        self.time_zone = spec.time_zone;
        self.interval_seconds = spec.interval_seconds;
        self.days_of_week = spec.days_of_week;
        self.updated_at = Utc::now();
    }

    pub fn entity_description(&self) -> String {
        format!(
            "调度策略 '{}' (ID: {}, 类型: {})",
            self.name,
            self.id,
            self.schedule_type.as_str()
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyFilter {
    pub schedule_type: Option<ScheduleType>,
    pub name_pattern: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 策略的排除日期
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludedDate {
    pub id: i64,
    pub strategy_id: i64,
    pub excluded_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludedDateSpec {
    pub date: NaiveDate,
    pub reason: Option<String>,
}

impl ExcludedDateSpec {
    pub fn new(date: NaiveDate, reason: Option<&str>) -> Self {
        Self {
            date,
            reason: reason.map(str::to_string),
        }
    }
}

/// 调度作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJob {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub job_type: String,
    pub job_config: serde_json::Value,
    pub schedule_strategy_id: i64,
    pub precondition_config: Option<serde_json::Value>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建或整体更新作业时的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub description: Option<String>,
    pub job_type: String,
    #[serde(default)]
    pub job_config: serde_json::Value,
    pub schedule_strategy_id: i64,
    pub precondition_config: Option<serde_json::Value>,
    pub enabled: bool,
}

impl SchedulerJob {
    pub fn from_spec(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            name: spec.name,
            description: spec.description,
            job_type: spec.job_type,
            job_config: spec.job_config,
            schedule_strategy_id: spec.schedule_strategy_id,
            precondition_config: spec.precondition_config,
            enabled: spec.enabled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_spec(&mut self, spec: JobSpec) {
        self.name = spec.name;
        self.description = spec.description;
        self.job_type = spec.job_type;
        self.job_config = spec.job_config;
        self.schedule_strategy_id = spec.schedule_strategy_id;
        self.precondition_config = spec.precondition_config;
        self.enabled = spec.enabled;
        self.updated_at = Utc::now();
    }

    pub fn entity_description(&self) -> String {
        format!(
            "作业 '{}' (ID: {}, 类型: {})",
            self.name, self.id, self.job_type
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub enabled: Option<bool>,
    pub job_type: Option<String>,
    pub strategy_id: Option<i64>,
    pub name_pattern: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 单次触发的最终状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RETRIED")]
    Retried,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Retried => "RETRIED",
            ExecutionStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "RETRIED" => Ok(ExecutionStatus::Retried),
            "SKIPPED" => Ok(ExecutionStatus::Skipped),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for ExecutionStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ExecutionStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<ExecutionStatus>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ExecutionStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 作业执行日志，写入后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: i64,
    pub job_id: i64,
    pub strategy_id: Option<i64>,
    pub scheduled_fire_time: DateTime<Utc>,
    pub actual_fire_time: DateTime<Utc>,
    pub finished_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub duration_ms: i64,
}

impl JobExecutionLog {
    pub fn entity_description(&self) -> String {
        format!(
            "执行日志 (作业ID: {}, 状态: {}, 重试次数: {})",
            self.job_id,
            self.status.as_str(),
            self.retry_count
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionLogFilter {
    pub job_id: Option<i64>,
    pub status: Option<ExecutionStatus>,
    /// 按计划触发时间过滤的时间窗口（闭区间）
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 作业执行统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecutionStats {
    pub job_id: i64,
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub retried_runs: i64,
    pub skipped_runs: i64,
    pub average_duration_ms: Option<f64>,
    pub last_fire_time: Option<DateTime<Utc>>,
}

impl JobExecutionStats {
    /// 成功率（百分比），跳过的触发不计入分母
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_runs - self.skipped_runs;
        if attempted > 0 {
            (self.successful_runs as f64 / attempted as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_string_forms() {
        for t in [
            ScheduleType::Cron,
            ScheduleType::FixedRate,
            ScheduleType::Daily,
            ScheduleType::Weekly,
        ] {
            assert_eq!(t.as_str().parse::<ScheduleType>().unwrap(), t);
        }
        assert!("HOURLY".parse::<ScheduleType>().is_err());

        let json = serde_json::to_string(&ExecutionStatus::Retried).unwrap();
        assert_eq!(json, "\"RETRIED\"");
        assert!("DONE".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_job_apply_spec_overwrites_everything() {
        let mut job = SchedulerJob::from_spec(JobSpec {
            name: "report".to_string(),
            description: Some("old".to_string()),
            job_type: "email".to_string(),
            job_config: serde_json::json!({"to": "a"}),
            schedule_strategy_id: 1,
            precondition_config: Some(serde_json::json!({"k": 1})),
            enabled: true,
        });

        job.apply_spec(JobSpec {
            name: "report-v2".to_string(),
            description: None,
            job_type: "sms".to_string(),
            job_config: serde_json::json!({}),
            schedule_strategy_id: 2,
            precondition_config: None,
            enabled: false,
        });

        assert_eq!(job.name, "report-v2");
        assert!(job.description.is_none());
        assert_eq!(job.job_type, "sms");
        assert_eq!(job.schedule_strategy_id, 2);
        assert!(job.precondition_config.is_none());
        assert!(!job.enabled);
    }

    #[test]
    fn test_success_rate_ignores_skipped() {
        let stats = JobExecutionStats {
            job_id: 1,
            total_runs: 10,
            successful_runs: 6,
            failed_runs: 1,
            retried_runs: 1,
            skipped_runs: 2,
            average_duration_ms: Some(12.0),
            last_fire_time: None,
        };
        assert_eq!(stats.success_rate(), 75.0);
    }
}
