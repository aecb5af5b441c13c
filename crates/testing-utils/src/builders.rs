//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, NaiveTime, Utc};
use scheduler_domain::entities::{
    ExecutionStatus, JobExecutionLog, JobSpec, ScheduleType, StrategySpec,
};
use scheduler_domain::ports::{FiringContext, TriggerKey};

/// Builder for creating test StrategySpec inputs
///
/// Defaults to a CRON strategy firing at the top of every hour.
pub struct StrategySpecBuilder {
    spec: StrategySpec,
}

impl StrategySpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: StrategySpec {
                name: "test_strategy".to_string(),
                description: None,
                schedule_type: ScheduleType::Cron,
                cron_expression: Some("0 0 * * * *".to_string()),
                start_time: None,
                end_time: None,
                time_zone: None,
                interval_seconds: None,
                days_of_week: vec![],
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.spec.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.spec.description = Some(description.to_string());
        self
    }

    pub fn cron(mut self, expression: &str) -> Self {
        self.spec.schedule_type = ScheduleType::Cron;
        self.spec.cron_expression = Some(expression.to_string());
        self
    }

    pub fn fixed_rate(mut self, interval_seconds: i64) -> Self {
        self.spec.schedule_type = ScheduleType::FixedRate;
        self.spec.cron_expression = None;
        self.spec.interval_seconds = Some(interval_seconds);
        self
    }

    pub fn daily(mut self, hour: u32, minute: u32, second: u32) -> Self {
        self.spec.schedule_type = ScheduleType::Daily;
        self.spec.cron_expression = None;
        self.spec.start_time = NaiveTime::from_hms_opt(hour, minute, second);
        self
    }

    pub fn weekly(mut self, hour: u32, minute: u32, days: &[&str]) -> Self {
        self.spec.schedule_type = ScheduleType::Weekly;
        self.spec.cron_expression = None;
        self.spec.start_time = NaiveTime::from_hms_opt(hour, minute, 0);
        self.spec.days_of_week = days.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_end_time(mut self, hour: u32, minute: u32) -> Self {
        self.spec.end_time = NaiveTime::from_hms_opt(hour, minute, 0);
        self
    }

    pub fn with_time_zone(mut self, time_zone: &str) -> Self {
        self.spec.time_zone = Some(time_zone.to_string());
        self
    }

    pub fn build(self) -> StrategySpec {
        self.spec
    }
}

impl Default for StrategySpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test JobSpec inputs
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(strategy_id: i64) -> Self {
        Self {
            spec: JobSpec {
                name: "test_job".to_string(),
                description: None,
                job_type: "log".to_string(),
                job_config: serde_json::json!({}),
                schedule_strategy_id: strategy_id,
                precondition_config: None,
                enabled: true,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.spec.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.spec.description = Some(description.to_string());
        self
    }

    pub fn with_job_type(mut self, job_type: &str) -> Self {
        self.spec.job_type = job_type.to_string();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.spec.job_config = config;
        self
    }

    pub fn with_precondition(mut self, precondition: serde_json::Value) -> Self {
        self.spec.precondition_config = Some(precondition);
        self
    }

    pub fn with_strategy(mut self, strategy_id: i64) -> Self {
        self.spec.schedule_strategy_id = strategy_id;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.spec.enabled = false;
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for creating firing contexts as the trigger engine would
pub struct FiringContextBuilder {
    context: FiringContext,
}

impl FiringContextBuilder {
    pub fn new(job_id: i64) -> Self {
        let now = Utc::now();
        Self {
            context: FiringContext {
                job_id,
                strategy_id: None,
                retry_count: 0,
                scheduled_fire_time: now,
                actual_fire_time: now,
                trigger_key: TriggerKey::for_job(job_id),
            },
        }
    }

    pub fn with_strategy(mut self, strategy_id: i64) -> Self {
        self.context.strategy_id = Some(strategy_id);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.context.retry_count = retry_count;
        self.context.trigger_key = TriggerKey::retry(self.context.job_id, Utc::now());
        self
    }

    /// Sets both the scheduled and the actual fire time
    pub fn fired_at(mut self, at: DateTime<Utc>) -> Self {
        self.context.scheduled_fire_time = at;
        self.context.actual_fire_time = at;
        self
    }

    pub fn build(self) -> FiringContext {
        self.context
    }
}

/// Builder for creating test JobExecutionLog entries
pub struct ExecutionLogBuilder {
    log: JobExecutionLog,
}

impl ExecutionLogBuilder {
    pub fn new(job_id: i64) -> Self {
        let now = Utc::now();
        Self {
            log: JobExecutionLog {
                id: 0,
                job_id,
                strategy_id: None,
                scheduled_fire_time: now,
                actual_fire_time: now,
                finished_time: now,
                status: ExecutionStatus::Success,
                error_message: None,
                retry_count: 0,
                duration_ms: 10,
            },
        }
    }

    pub fn with_strategy(mut self, strategy_id: i64) -> Self {
        self.log.strategy_id = Some(strategy_id);
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.log.scheduled_fire_time = at;
        self.log.actual_fire_time = at;
        self.log.finished_time = at;
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.log.status = status;
        self
    }

    pub fn failed(mut self, message: &str) -> Self {
        self.log.status = ExecutionStatus::Failed;
        self.log.error_message = Some(message.to_string());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.log.retry_count = retry_count;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.log.duration_ms = duration_ms;
        self
    }

    pub fn build(self) -> JobExecutionLog {
        self.log
    }
}
