use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use scheduler_config::SchedulerConfig;
use scheduler_domain::{JobData, JobKey, MisfirePolicy, Trigger, TriggerEngine, TriggerKey, TriggerSchedule};

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 失败后最多重试次数
    pub max_retry_attempts: u32,
    /// 固定重试间隔
    pub retry_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_interval: Duration::from_secs(60),
        }
    }
}

impl From<&SchedulerConfig> for RetryConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            retry_interval: config.retry_interval(),
        }
    }
}

/// 重试服务接口
#[async_trait]
pub trait RetryService: Send + Sync {
    /// 为失败的触发安排一次性重试，返回是否已成功安排
    ///
    /// 安排过程中的任何错误只记录日志，不向上传播。
    async fn schedule_retry(&self, job_id: i64, strategy_id: Option<i64>, retry_count: u32)
        -> bool;

    /// 计算下次重试时间
    fn calculate_next_retry_time(&self, now: DateTime<Utc>) -> DateTime<Utc>;
}

/// 通过触发引擎的一次性触发器实现重试
pub struct TriggerRetryService {
    engine: Arc<dyn TriggerEngine>,
    retry_config: RetryConfig,
}

impl TriggerRetryService {
    pub fn new(engine: Arc<dyn TriggerEngine>, retry_config: Option<RetryConfig>) -> Self {
        Self {
            engine,
            retry_config: retry_config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// 下一次重试的序号，超过上限时返回 `None`
    pub fn next_retry_count(&self, retry_count: u32) -> Option<u32> {
        let next = retry_count.saturating_add(1);
        (next <= self.retry_config.max_retry_attempts).then_some(next)
    }
}

#[async_trait]
impl RetryService for TriggerRetryService {
    async fn schedule_retry(
        &self,
        job_id: i64,
        strategy_id: Option<i64>,
        retry_count: u32,
    ) -> bool {
        let Some(next_retry) = self.next_retry_count(retry_count) else {
            info!(
                "作业 {} 已达到最大重试次数 {}，不再重试",
                job_id, self.retry_config.max_retry_attempts
            );
            return false;
        };

        let job_key = JobKey::for_job(job_id);
        match self.engine.check_exists(&job_key).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("作业 {} 在触发引擎中不存在，放弃重试", job_id);
                return false;
            }
            Err(e) => {
                warn!("检查作业 {} 是否存在于触发引擎失败: {}", job_id, e);
                return false;
            }
        }

        let now = Utc::now();
        let fire_at = self.calculate_next_retry_time(now);
        let trigger = Trigger {
            key: TriggerKey::retry(job_id, now),
            job_key,
            schedule: TriggerSchedule::Once { fire_at },
            misfire_policy: MisfirePolicy::FireNow,
            data: Some(JobData {
                job_id,
                strategy_id,
                retry_count: next_retry,
            }),
        };

        match self.engine.schedule_trigger(&trigger).await {
            Ok(()) => {
                info!(
                    "为作业 {} 安排第 {} 次重试，触发时间: {}",
                    job_id,
                    next_retry,
                    fire_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                true
            }
            Err(e) => {
                warn!("为作业 {} 安排重试失败: {}", job_id, e);
                false
            }
        }
    }

    fn calculate_next_retry_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval = chrono::Duration::from_std(self.retry_config.retry_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let next = now + interval;
        debug!("计算下次重试时间: {}", next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_testing_utils::MockTriggerEngine;

    fn service(max: u32) -> TriggerRetryService {
        TriggerRetryService::new(
            Arc::new(MockTriggerEngine::new()),
            Some(RetryConfig {
                max_retry_attempts: max,
                retry_interval: Duration::from_secs(30),
            }),
        )
    }

    #[test]
    fn test_next_retry_count_respects_limit() {
        let service = service(2);
        assert_eq!(service.next_retry_count(0), Some(1));
        assert_eq!(service.next_retry_count(1), Some(2));
        assert_eq!(service.next_retry_count(2), None);
        assert_eq!(service.next_retry_count(u32::MAX), None);
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        assert_eq!(service(0).next_retry_count(0), None);
    }

    #[test]
    fn test_calculate_next_retry_time() {
        let service = service(3);
        let now = Utc::now();
        assert_eq!(
            service.calculate_next_retry_time(now),
            now + chrono::Duration::seconds(30)
        );
    }

    #[test]
    fn test_retry_config_from_scheduler_config() {
        let config = SchedulerConfig {
            max_retry_attempts: 5,
            retry_interval_seconds: 10,
            default_time_zone: None,
        };
        let retry = RetryConfig::from(&config);
        assert_eq!(retry.max_retry_attempts, 5);
        assert_eq!(retry.retry_interval, Duration::from_secs(10));
    }
}
