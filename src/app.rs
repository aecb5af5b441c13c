use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tokio::sync::broadcast;
use tracing::{info, warn};

use scheduler_config::AppConfig;
use scheduler_dispatcher::cron_utils::resolve_time_zone;
use scheduler_dispatcher::{
    ExecutionLogService, HandlerRegistry, JobExecutor, JobRegistry, RetryConfig, StrategyService,
    SyncReport, TriggerRetryService,
};
use scheduler_domain::{
    ExcludedDateRepository, ExecutionLogRepository, JobRepository, StrategyRepository,
};
use scheduler_infrastructure::{
    DatabaseManager, LocalTriggerEngine, SqliteExcludedDateRepository,
    SqliteExecutionLogRepository, SqliteJobRepository, SqliteStrategyRepository,
};

use crate::handlers::{LogJobHandler, LOG_JOB_TYPE};

/// 主应用程序：持有数据库、触发引擎以及全部服务
pub struct Application {
    database: DatabaseManager,
    engine: Arc<LocalTriggerEngine>,
    handlers: Arc<HandlerRegistry>,
    job_registry: Arc<JobRegistry>,
    strategy_service: Arc<StrategyService>,
    log_service: Arc<ExecutionLogService>,
}

impl Application {
    /// 创建新的应用实例
    ///
    /// 完成数据库迁移与组件装配，但不会向触发引擎注册任何作业，
    /// 注册发生在 [`Application::start`]。
    pub async fn new(config: AppConfig) -> Result<Self> {
        let default_time_zone = parse_default_time_zone(&config)?;
        info!(
            "初始化应用程序，默认时区: {}",
            default_time_zone
                .map(|tz| tz.name().to_string())
                .unwrap_or_else(|| "系统本地时区".to_string())
        );

        let database = DatabaseManager::new(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        database.migrate().await.context("执行数据库迁移失败")?;

        let pool = database.pool().clone();
        let strategy_repo: Arc<dyn StrategyRepository> =
            Arc::new(SqliteStrategyRepository::new(pool.clone()));
        let excluded_date_repo: Arc<dyn ExcludedDateRepository> =
            Arc::new(SqliteExcludedDateRepository::new(pool.clone()));
        let job_repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
        let log_repo: Arc<dyn ExecutionLogRepository> =
            Arc::new(SqliteExecutionLogRepository::new(pool));

        let engine = Arc::new(LocalTriggerEngine::new());

        let handlers = Arc::new(HandlerRegistry::new());
        handlers
            .register(LOG_JOB_TYPE, Arc::new(LogJobHandler))
            .await;

        let retry_service = Arc::new(TriggerRetryService::new(
            engine.clone(),
            Some(RetryConfig::from(&config.scheduler)),
        ));

        let executor = Arc::new(JobExecutor::new(
            job_repo.clone(),
            strategy_repo.clone(),
            excluded_date_repo.clone(),
            log_repo.clone(),
            handlers.clone(),
            retry_service,
            default_time_zone,
        ));
        engine
            .set_listener(executor)
            .context("注册触发监听器失败")?;

        let job_registry = Arc::new(JobRegistry::new(
            job_repo.clone(),
            strategy_repo.clone(),
            engine.clone(),
            default_time_zone,
        ));
        let strategy_service = Arc::new(StrategyService::new(
            strategy_repo,
            excluded_date_repo,
            job_repo.clone(),
            job_registry.clone(),
            default_time_zone,
        ));
        let log_service = Arc::new(ExecutionLogService::new(log_repo, job_repo));

        Ok(Self {
            database,
            engine,
            handlers,
            job_registry,
            strategy_service,
            log_service,
        })
    }

    /// 作业类型处理器注册表，嵌入方可在启动前后注册自己的处理器
    pub fn handlers(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.handlers)
    }

    pub fn job_registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.job_registry)
    }

    pub fn strategy_service(&self) -> Arc<StrategyService> {
        Arc::clone(&self.strategy_service)
    }

    pub fn log_service(&self) -> Arc<ExecutionLogService> {
        Arc::clone(&self.log_service)
    }

    /// 把持久化的作业全部同步到触发引擎
    pub async fn start(&self) -> Result<SyncReport> {
        let report = self
            .job_registry
            .sync_all_jobs()
            .await
            .context("启动时同步作业失败")?;

        if report.failed > 0 {
            warn!("{} 个作业未能注册到触发引擎", report.failed);
        }
        info!(
            "调度器已启动，已注册 {} 个作业，{} 个作业处于禁用状态",
            report.registered, report.unregistered
        );
        Ok(report)
    }

    /// 启动并一直运行到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await?;

        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，停止调度器");

        self.shutdown().await;
        Ok(())
    }

    /// 停止所有定时器并关闭连接池；正在执行的触发不会被中断
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.database.close().await;
        info!("调度器已停止");
    }
}

fn parse_default_time_zone(config: &AppConfig) -> Result<Option<Tz>> {
    resolve_time_zone(config.scheduler.default_time_zone.as_deref(), None)
        .context("解析默认时区失败")
}
