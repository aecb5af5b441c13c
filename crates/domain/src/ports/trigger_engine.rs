//! 触发引擎端口
//!
//! 核心只负责把作业定义同步给外部触发引擎，并响应引擎回调；
//! 定时与触发机制由引擎实现。键采用确定的命名空间：
//! `job:{id}`、`trigger:{id}`，以及一次性重试触发器 `retry:{id}:{timestamp}`。

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use scheduler_errors::SchedulerResult;

use crate::entities::SchedulerJob;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    pub fn for_job(job_id: i64) -> Self {
        Self(format!("job:{job_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey(String);

impl TriggerKey {
    /// 作业的常驻周期触发器
    pub fn for_job(job_id: i64) -> Self {
        Self(format!("trigger:{job_id}"))
    }

    /// 一次性重试触发器，以微秒时间戳区分同一作业的多次重试
    pub fn retry(job_id: i64, at: DateTime<Utc>) -> Self {
        Self(format!("retry:{job_id}:{}", at.timestamp_micros()))
    }

    pub fn is_retry(&self) -> bool {
        self.0.starts_with("retry:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 随作业定义或触发器一起交给引擎的数据
///
/// 触发时触发器上的数据覆盖作业定义上的数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobData {
    pub job_id: i64,
    pub strategy_id: Option<i64>,
    pub retry_count: u32,
}

/// 注册到引擎的作业定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub key: JobKey,
    pub job_type: String,
    pub data: JobData,
}

impl JobDefinition {
    /// 初始重试次数为 0
    pub fn for_job(job: &SchedulerJob) -> Self {
        Self {
            key: JobKey::for_job(job.id),
            job_type: job.job_type.clone(),
            data: JobData {
                job_id: job.id,
                strategy_id: Some(job.schedule_strategy_id),
                retry_count: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSchedule {
    /// 周期触发；`time_zone` 为空时使用系统本地时区
    Cron {
        expression: String,
        time_zone: Option<Tz>,
    },
    /// 在指定时刻触发一次
    Once { fire_at: DateTime<Utc> },
}

/// 错过触发时间后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisfirePolicy {
    /// 立即补触发一次
    FireNow,
    /// 放弃错过的触发，等待下一次
    #[default]
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub schedule: TriggerSchedule,
    pub misfire_policy: MisfirePolicy,
    /// 覆盖作业定义数据；为空时沿用作业定义的数据
    pub data: Option<JobData>,
}

impl Trigger {
    pub fn recurring(job_id: i64, expression: String, time_zone: Option<Tz>) -> Self {
        Self {
            key: TriggerKey::for_job(job_id),
            job_key: JobKey::for_job(job_id),
            schedule: TriggerSchedule::Cron {
                expression,
                time_zone,
            },
            misfire_policy: MisfirePolicy::Skip,
            data: None,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self.schedule, TriggerSchedule::Once { .. })
    }
}

/// 引擎回调时传入的单次触发上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringContext {
    pub job_id: i64,
    pub strategy_id: Option<i64>,
    pub retry_count: u32,
    pub scheduled_fire_time: DateTime<Utc>,
    pub actual_fire_time: DateTime<Utc>,
    pub trigger_key: TriggerKey,
}

impl FiringContext {
    pub fn from_data(
        data: &JobData,
        trigger_key: TriggerKey,
        scheduled_fire_time: DateTime<Utc>,
        actual_fire_time: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: data.job_id,
            strategy_id: data.strategy_id,
            retry_count: data.retry_count,
            scheduled_fire_time,
            actual_fire_time,
            trigger_key,
        }
    }
}

/// 引擎在触发时刻回调的监听器
#[async_trait]
pub trait FiringListener: Send + Sync {
    async fn on_fire(&self, context: FiringContext) -> SchedulerResult<()>;
}

/// 外部触发引擎接口
#[async_trait]
pub trait TriggerEngine: Send + Sync {
    /// 同时注册作业定义与其触发器
    async fn schedule(&self, definition: &JobDefinition, trigger: &Trigger) -> SchedulerResult<()>;

    /// 为已存在的作业追加触发器（用于一次性重试）
    async fn schedule_trigger(&self, trigger: &Trigger) -> SchedulerResult<()>;

    /// 以新的触发器替换已存在的触发器；旧触发器不存在时直接注册
    async fn reschedule(&self, key: &TriggerKey, trigger: &Trigger) -> SchedulerResult<()>;

    /// 返回是否确实移除了触发器
    async fn unschedule(&self, key: &TriggerKey) -> SchedulerResult<bool>;

    async fn add_job(&self, definition: &JobDefinition, replace_if_exists: bool)
        -> SchedulerResult<()>;

    /// 删除作业定义及其全部触发器
    async fn delete_job(&self, key: &JobKey) -> SchedulerResult<bool>;

    async fn check_exists(&self, key: &JobKey) -> SchedulerResult<bool>;
}
