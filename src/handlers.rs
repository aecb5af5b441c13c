use async_trait::async_trait;
use tracing::info;

use scheduler_domain::{FiringContext, JobHandler, SchedulerJob};
use scheduler_errors::SchedulerResult;

/// 内置的 `log` 作业类型：只把作业配置写入日志
///
/// 业务处理器由嵌入方通过 [`scheduler_dispatcher::HandlerRegistry`] 另行注册。
pub struct LogJobHandler;

pub const LOG_JOB_TYPE: &str = "log";

#[async_trait]
impl JobHandler for LogJobHandler {
    async fn handle(&self, job: &SchedulerJob, context: &FiringContext) -> SchedulerResult<()> {
        info!(
            job.id = job.id,
            job.name = %job.name,
            retry.count = context.retry_count,
            payload = %job.job_config,
            "执行日志作业"
        );
        Ok(())
    }
}
