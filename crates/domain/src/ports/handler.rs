use async_trait::async_trait;
use scheduler_errors::SchedulerResult;

use crate::entities::SchedulerJob;
use crate::ports::trigger_engine::FiringContext;

/// 作业处理器，按作业类型注册
///
/// 业务逻辑由外部提供；返回错误即视为本次触发失败。
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &SchedulerJob, context: &FiringContext) -> SchedulerResult<()>;
}
