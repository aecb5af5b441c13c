//! 作业注册表
//!
//! 负责作业的增删改查，以及把持久化的作业同步到触发引擎。
//! 数据库写入与引擎同步不是原子的，二者可能短暂不一致，
//! 直到下一次显式同步（更新、启用或 [`JobRegistry::sync_all_jobs`]）。

use std::sync::Arc;

use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use scheduler_domain::{
    JobDefinition, JobFilter, JobKey, JobRepository, JobSpec, SchedulerJob, StrategyRepository,
    Trigger, TriggerEngine, TriggerKey,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::observability::StructuredLogger;

use crate::cron_utils::{resolve_cron_expression, resolve_time_zone};

/// 启动时全量同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub registered: usize,
    pub unregistered: usize,
    pub failed: usize,
}

pub struct JobRegistry {
    job_repo: Arc<dyn JobRepository>,
    strategy_repo: Arc<dyn StrategyRepository>,
    engine: Arc<dyn TriggerEngine>,
    default_time_zone: Option<Tz>,
}

impl JobRegistry {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        strategy_repo: Arc<dyn StrategyRepository>,
        engine: Arc<dyn TriggerEngine>,
        default_time_zone: Option<Tz>,
    ) -> Self {
        Self {
            job_repo,
            strategy_repo,
            engine,
            default_time_zone,
        }
    }

    #[instrument(skip(self, spec), fields(job.name = %spec.name))]
    pub async fn create_job(&self, spec: JobSpec) -> SchedulerResult<SchedulerJob> {
        Self::validate_spec(&spec)?;
        self.require_strategy(spec.schedule_strategy_id).await?;

        let job = self.job_repo.create(&SchedulerJob::from_spec(spec)).await?;
        if job.enabled {
            self.schedule_job(&job).await?;
        }

        info!("创建{}", job.entity_description());
        Ok(job)
    }

    /// 整体覆盖作业并重新同步，即使只修改了描述也会重新注册
    #[instrument(skip(self, spec), fields(job.id = id))]
    pub async fn update_job(&self, id: i64, spec: JobSpec) -> SchedulerResult<SchedulerJob> {
        let mut job = self.require_job(id).await?;
        Self::validate_spec(&spec)?;
        self.require_strategy(spec.schedule_strategy_id).await?;

        job.apply_spec(spec);
        self.job_repo.update(&job).await?;
        self.sync_job(&job).await?;

        info!("更新{}", job.entity_description());
        Ok(job)
    }

    /// 先注销引擎中的注册，再删除数据库记录
    #[instrument(skip(self), fields(job.id = id))]
    pub async fn delete_job(&self, id: i64) -> SchedulerResult<()> {
        let job = self.require_job(id).await?;
        self.unschedule_job(id).await?;
        self.job_repo.delete(id).await?;

        info!("删除{}", job.entity_description());
        Ok(())
    }

    pub async fn enable_job(&self, id: i64) -> SchedulerResult<SchedulerJob> {
        self.set_enabled(id, true).await
    }

    pub async fn disable_job(&self, id: i64) -> SchedulerResult<SchedulerJob> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> SchedulerResult<SchedulerJob> {
        let mut job = self.require_job(id).await?;
        job.enabled = enabled;
        job.updated_at = chrono::Utc::now();
        self.job_repo.update(&job).await?;
        self.sync_job(&job).await?;

        info!(
            "{}{}",
            if enabled { "启用" } else { "禁用" },
            job.entity_description()
        );
        Ok(job)
    }

    /// 策略变更后重新同步其下所有作业，返回同步的作业数
    pub async fn reschedule_jobs_for_strategy(&self, strategy_id: i64) -> SchedulerResult<usize> {
        let jobs = self.job_repo.get_by_strategy(strategy_id).await?;
        for job in &jobs {
            self.sync_job(job).await?;
        }
        debug!("策略 {} 下的 {} 个作业已重新同步", strategy_id, jobs.len());
        Ok(jobs.len())
    }

    /// 将全部持久化作业同步到触发引擎，单个作业失败不会中断整体同步
    pub async fn sync_all_jobs(&self) -> SchedulerResult<SyncReport> {
        let jobs = self.job_repo.list(&JobFilter::default()).await?;
        let mut report = SyncReport::default();

        for job in &jobs {
            match self.sync_job(job).await {
                Ok(()) if job.enabled => report.registered += 1,
                Ok(()) => report.unregistered += 1,
                Err(e) => {
                    warn!("同步{}失败: {}", job.entity_description(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            registered = report.registered,
            unregistered = report.unregistered,
            failed = report.failed,
            "作业同步完成"
        );
        Ok(report)
    }

    pub async fn get_job(&self, id: i64) -> SchedulerResult<SchedulerJob> {
        self.require_job(id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> SchedulerResult<Vec<SchedulerJob>> {
        self.job_repo.list(filter).await
    }

    async fn sync_job(&self, job: &SchedulerJob) -> SchedulerResult<()> {
        if job.enabled {
            self.schedule_job(job).await
        } else {
            self.unschedule_job(job.id).await
        }
    }

    async fn schedule_job(&self, job: &SchedulerJob) -> SchedulerResult<()> {
        let strategy = self.require_strategy(job.schedule_strategy_id).await?;
        let expression = resolve_cron_expression(&strategy)
            .map_err(|e| Self::sync_failure(job.id, "解析调度表达式", e))?;
        let zone = resolve_time_zone(strategy.time_zone.as_deref(), self.default_time_zone)
            .map_err(|e| Self::sync_failure(job.id, "解析时区", e))?;

        let definition = JobDefinition::for_job(job);
        let trigger = Trigger::recurring(job.id, expression, zone);

        let exists = self
            .engine
            .check_exists(&definition.key)
            .await
            .map_err(|e| Self::sync_failure(job.id, "检查注册", e))?;

        if exists {
            self.engine
                .add_job(&definition, true)
                .await
                .map_err(|e| Self::sync_failure(job.id, "替换作业定义", e))?;
            self.engine
                .reschedule(&trigger.key, &trigger)
                .await
                .map_err(|e| Self::sync_failure(job.id, "重新调度触发器", e))?;
        } else {
            self.engine
                .schedule(&definition, &trigger)
                .await
                .map_err(|e| Self::sync_failure(job.id, "注册", e))?;
        }

        StructuredLogger::log_job_registration(job.id, trigger.key.as_str(), true);
        Ok(())
    }

    /// 注销不存在的注册是幂等的
    async fn unschedule_job(&self, job_id: i64) -> SchedulerResult<()> {
        self.engine
            .unschedule(&TriggerKey::for_job(job_id))
            .await
            .map_err(|e| Self::sync_failure(job_id, "注销触发器", e))?;
        self.engine
            .delete_job(&JobKey::for_job(job_id))
            .await
            .map_err(|e| Self::sync_failure(job_id, "删除作业定义", e))?;

        StructuredLogger::log_job_registration(job_id, TriggerKey::for_job(job_id).as_str(), false);
        Ok(())
    }

    async fn require_job(&self, id: i64) -> SchedulerResult<SchedulerJob> {
        self.job_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(id))
    }

    async fn require_strategy(
        &self,
        strategy_id: i64,
    ) -> SchedulerResult<scheduler_domain::ScheduleStrategy> {
        self.strategy_repo
            .get_by_id(strategy_id)
            .await?
            .ok_or_else(|| SchedulerError::strategy_not_found(strategy_id))
    }

    fn validate_spec(spec: &JobSpec) -> SchedulerResult<()> {
        if spec.name.trim().is_empty() {
            return Err(SchedulerError::validation_error("作业名称不能为空"));
        }
        if spec.job_type.trim().is_empty() {
            return Err(SchedulerError::validation_error("作业类型不能为空"));
        }
        Ok(())
    }

    fn sync_failure(job_id: i64, action: &str, error: SchedulerError) -> SchedulerError {
        SchedulerError::state_error(format!(
            "作业 {job_id} 与触发引擎同步失败({action}): {error}"
        ))
    }
}
