//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scheduler_errors::SchedulerResult;

use crate::entities::{
    ExcludedDate, ExcludedDateSpec, ExecutionLogFilter, JobExecutionLog, JobExecutionStats,
    JobFilter, ScheduleStrategy, SchedulerJob, StrategyFilter,
};

/// 调度策略仓储
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn create(&self, strategy: &ScheduleStrategy) -> SchedulerResult<ScheduleStrategy>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<ScheduleStrategy>>;
    async fn update(&self, strategy: &ScheduleStrategy) -> SchedulerResult<()>;
    /// 返回是否确实删除了记录
    async fn delete(&self, id: i64) -> SchedulerResult<bool>;
    async fn list(&self, filter: &StrategyFilter) -> SchedulerResult<Vec<ScheduleStrategy>>;
}

/// 排除日期仓储
#[async_trait]
pub trait ExcludedDateRepository: Send + Sync {
    /// 在同一事务中删除策略的全部排除日期并批量写入新集合
    async fn replace_for_strategy(
        &self,
        strategy_id: i64,
        dates: &[ExcludedDateSpec],
    ) -> SchedulerResult<u64>;
    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<ExcludedDate>>;
    async fn delete_by_strategy(&self, strategy_id: i64) -> SchedulerResult<u64>;
    async fn is_excluded(&self, strategy_id: i64, date: NaiveDate) -> SchedulerResult<bool>;
}

/// 作业仓储
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &SchedulerJob) -> SchedulerResult<SchedulerJob>;
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<SchedulerJob>>;
    async fn update(&self, job: &SchedulerJob) -> SchedulerResult<()>;
    async fn delete(&self, id: i64) -> SchedulerResult<bool>;
    async fn list(&self, filter: &JobFilter) -> SchedulerResult<Vec<SchedulerJob>>;
    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<SchedulerJob>>;
    async fn count_by_strategy(&self, strategy_id: i64) -> SchedulerResult<i64>;
}

/// 执行日志仓储，只追加
///
/// 写入使用独立连接（自动提交），不参与处理器自身的事务。
#[async_trait]
pub trait ExecutionLogRepository: Send + Sync {
    async fn append(&self, log: &JobExecutionLog) -> SchedulerResult<JobExecutionLog>;
    /// 按计划触发时间倒序返回
    async fn list(&self, filter: &ExecutionLogFilter) -> SchedulerResult<Vec<JobExecutionLog>>;
    async fn stats(
        &self,
        job_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> SchedulerResult<JobExecutionStats>;
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64>;
}
