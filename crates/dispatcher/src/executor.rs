//! 单次触发的执行编排
//!
//! 状态流转：`NEW → {SKIPPED, SUCCESS, FAILED, RETRIED}`，每个终态都会写入一条执行日志。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use tracing::{error, instrument, warn};

use scheduler_domain::{
    ExcludedDateRepository, ExecutionLogRepository, ExecutionStatus, FiringContext,
    FiringListener, JobExecutionLog, JobHandler, JobRepository, SchedulerJob, StrategyRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::observability::{MetricsCollector, StructuredLogger};

use crate::cron_utils::{date_in_zone, resolve_time_zone};
use crate::handler_registry::HandlerRegistry;
use crate::retry_service::RetryService;

pub struct JobExecutor {
    job_repo: Arc<dyn JobRepository>,
    strategy_repo: Arc<dyn StrategyRepository>,
    excluded_date_repo: Arc<dyn ExcludedDateRepository>,
    log_repo: Arc<dyn ExecutionLogRepository>,
    handlers: Arc<HandlerRegistry>,
    retry_service: Arc<dyn RetryService>,
    metrics: MetricsCollector,
    default_time_zone: Option<Tz>,
}

impl JobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        strategy_repo: Arc<dyn StrategyRepository>,
        excluded_date_repo: Arc<dyn ExcludedDateRepository>,
        log_repo: Arc<dyn ExecutionLogRepository>,
        handlers: Arc<HandlerRegistry>,
        retry_service: Arc<dyn RetryService>,
        default_time_zone: Option<Tz>,
    ) -> Self {
        Self {
            job_repo,
            strategy_repo,
            excluded_date_repo,
            log_repo,
            handlers,
            retry_service,
            metrics: MetricsCollector::new(),
            default_time_zone,
        }
    }

    /// 执行一次触发并返回终态
    ///
    /// 作业不存在时直接返回错误，不写日志；处理器失败时先写日志（RETRIED 或 FAILED），
    /// 再把原始错误返回给调用方。
    #[instrument(skip(self, context), fields(job.id = context.job_id, retry.count = context.retry_count))]
    pub async fn execute(&self, context: FiringContext) -> SchedulerResult<ExecutionStatus> {
        let job = self
            .job_repo
            .get_by_id(context.job_id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(context.job_id))?;
        let strategy_id = context.strategy_id.unwrap_or(job.schedule_strategy_id);

        StructuredLogger::log_job_fired(
            job.id,
            &job.name,
            &job.job_type,
            context.retry_count,
            context.scheduled_fire_time,
        );

        if !job.enabled {
            self.record(
                &job,
                strategy_id,
                &context,
                ExecutionStatus::Skipped,
                Some("任务已禁用".to_string()),
                0,
            )
            .await?;
            return Ok(ExecutionStatus::Skipped);
        }

        let zone = self.strategy_zone(strategy_id).await?;
        let today = date_in_zone(zone, context.actual_fire_time);
        if self.excluded_date_repo.is_excluded(strategy_id, today).await? {
            self.record(
                &job,
                strategy_id,
                &context,
                ExecutionStatus::Skipped,
                Some(format!("排除日期: {today}")),
                0,
            )
            .await?;
            return Ok(ExecutionStatus::Skipped);
        }

        let started = Instant::now();
        let outcome = match self.handlers.get(&job.job_type).await {
            Some(handler) => run_handler(handler, job.clone(), context.clone()).await,
            None => Err(SchedulerError::execution_error(format!(
                "未注册作业类型 {} 的处理器",
                job.job_type
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(()) => {
                self.record(&job, strategy_id, &context, ExecutionStatus::Success, None, duration_ms)
                    .await?;
                Ok(ExecutionStatus::Success)
            }
            Err(handler_error) => {
                let retried = self
                    .retry_service
                    .schedule_retry(job.id, Some(strategy_id), context.retry_count)
                    .await;
                let status = if retried {
                    self.metrics.record_retry_scheduled(&job.job_type, context.retry_count + 1);
                    ExecutionStatus::Retried
                } else {
                    ExecutionStatus::Failed
                };

                // 日志写入失败不能掩盖处理器的原始错误
                if let Err(log_error) = self
                    .record(
                        &job,
                        strategy_id,
                        &context,
                        status,
                        Some(handler_error.to_string()),
                        duration_ms,
                    )
                    .await
                {
                    error!("写入作业 {} 的执行日志失败: {}", job.id, log_error);
                }
                Err(handler_error)
            }
        }
    }

    /// 策略所在时区；策略缺失或时区无效时回退到默认时区
    async fn strategy_zone(&self, strategy_id: i64) -> SchedulerResult<Option<Tz>> {
        let strategy = self.strategy_repo.get_by_id(strategy_id).await?;
        let name = strategy.as_ref().and_then(|s| s.time_zone.as_deref());
        Ok(resolve_time_zone(name, self.default_time_zone).unwrap_or_else(|e| {
            warn!("策略 {} 的时区无效，使用默认时区: {}", strategy_id, e);
            self.default_time_zone
        }))
    }

    async fn record(
        &self,
        job: &SchedulerJob,
        strategy_id: i64,
        context: &FiringContext,
        status: ExecutionStatus,
        error_message: Option<String>,
        duration_ms: i64,
    ) -> SchedulerResult<JobExecutionLog> {
        let log = JobExecutionLog {
            id: 0,
            job_id: job.id,
            strategy_id: Some(strategy_id),
            scheduled_fire_time: context.scheduled_fire_time,
            actual_fire_time: context.actual_fire_time,
            finished_time: Utc::now(),
            status,
            error_message,
            retry_count: context.retry_count,
            duration_ms,
        };

        self.metrics
            .record_firing(&job.job_type, status.as_str(), duration_ms as f64);
        StructuredLogger::log_job_completed(
            job.id,
            &job.name,
            status.as_str(),
            duration_ms,
            log.error_message.as_deref(),
        );

        self.log_repo.append(&log).await
    }
}

/// 在独立任务中运行处理器，处理器 panic 按普通失败处理
async fn run_handler(
    handler: Arc<dyn JobHandler>,
    job: SchedulerJob,
    context: FiringContext,
) -> SchedulerResult<()> {
    let job_type = job.job_type.clone();
    tokio::spawn(async move { handler.handle(&job, &context).await })
        .await
        .unwrap_or_else(|join_error| {
            if join_error.is_panic() {
                error!("作业类型 {} 的处理器发生panic", job_type);
                Err(SchedulerError::execution_error(format!(
                    "作业类型 {job_type} 的处理器发生panic"
                )))
            } else {
                Err(SchedulerError::execution_error(format!(
                    "作业类型 {job_type} 的处理器任务被取消"
                )))
            }
        })
}

#[async_trait]
impl FiringListener for JobExecutor {
    async fn on_fire(&self, context: FiringContext) -> SchedulerResult<()> {
        self.execute(context).await.map(|_| ())
    }
}
