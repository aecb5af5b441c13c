use std::time::Duration;

use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 作业执行与失败重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 单次触发失败后允许的最大重试次数
    pub max_retry_attempts: u32,
    /// 一次性重试触发器的延迟（秒）
    pub retry_interval_seconds: u64,
    /// 策略未声明时区时使用的默认时区，缺省为系统本地时区
    #[serde(default)]
    pub default_time_zone: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_interval_seconds: 60,
            default_time_zone: None,
        }
    }
}

impl SchedulerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.retry_interval_seconds == 0 {
            return Err(crate::ConfigError::Validation(
                "scheduler.retry_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(ref tz) = self.default_time_zone {
            ValidationUtils::validate_time_zone(tz, "scheduler.default_time_zone")?;
        }
        Ok(())
    }
}
