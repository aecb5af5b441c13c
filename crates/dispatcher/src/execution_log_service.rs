use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use scheduler_domain::{
    ExecutionLogFilter, ExecutionLogRepository, JobExecutionLog, JobExecutionStats, JobRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};

/// 执行日志查询
pub struct ExecutionLogService {
    log_repo: Arc<dyn ExecutionLogRepository>,
    job_repo: Arc<dyn JobRepository>,
}

impl ExecutionLogService {
    pub fn new(log_repo: Arc<dyn ExecutionLogRepository>, job_repo: Arc<dyn JobRepository>) -> Self {
        Self { log_repo, job_repo }
    }

    /// 按计划触发时间倒序返回；指定的作业不存在时返回引用错误
    pub async fn list_logs(
        &self,
        filter: &ExecutionLogFilter,
    ) -> SchedulerResult<Vec<JobExecutionLog>> {
        if let Some(job_id) = filter.job_id {
            self.require_job(job_id).await?;
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(SchedulerError::validation_error(format!(
                    "时间窗口无效: {from} 晚于 {to}"
                )));
            }
        }
        self.log_repo.list(filter).await
    }

    pub async fn job_stats(
        &self,
        job_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> SchedulerResult<JobExecutionStats> {
        self.require_job(job_id).await?;
        self.log_repo.stats(job_id, since).await
    }

    /// 删除计划触发时间早于 `cutoff` 的日志，返回删除条数
    pub async fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let purged = self.log_repo.purge_before(cutoff).await?;
        info!("清理 {} 之前的执行日志 {} 条", cutoff, purged);
        Ok(purged)
    }

    async fn require_job(&self, job_id: i64) -> SchedulerResult<()> {
        self.job_repo
            .get_by_id(job_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| SchedulerError::job_not_found(job_id))
    }
}
