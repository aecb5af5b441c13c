//! Dispatcher
//!
//! 调度核心：策略维护与表达式推导、作业注册与引擎同步、
//! 单次触发的执行编排、失败重试以及执行日志查询。

pub mod cron_utils;
pub mod execution_log_service;
pub mod executor;
pub mod handler_registry;
pub mod job_registry;
pub mod retry_service;
pub mod strategy_service;

pub use cron_utils::CronScheduler;
pub use execution_log_service::ExecutionLogService;
pub use executor::JobExecutor;
pub use handler_registry::HandlerRegistry;
pub use job_registry::{JobRegistry, SyncReport};
pub use retry_service::{RetryConfig, RetryService, TriggerRetryService};
pub use strategy_service::StrategyService;
