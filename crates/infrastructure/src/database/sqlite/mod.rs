pub mod sqlite_excluded_date_repository;
pub mod sqlite_execution_log_repository;
pub mod sqlite_job_repository;
pub mod sqlite_strategy_repository;

pub use sqlite_excluded_date_repository::SqliteExcludedDateRepository;
pub use sqlite_execution_log_repository::SqliteExecutionLogRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_strategy_repository::SqliteStrategyRepository;

use anyhow::{Context, Result};
use scheduler_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 按配置创建连接池
    ///
    /// 内存数据库只保留一个永不过期的连接，否则连接回收后数据会丢失。
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库地址: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.url))?;

        info!("数据库连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    /// 以现有连接池构造，测试中使用
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移，可重复执行
    pub async fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool).await.context("数据库迁移失败")
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub type DbPool = Pool<Sqlite>;

/// 创建调度相关的表与索引
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Running SQLite database migrations");

    // 调度策略表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_strategies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            schedule_type TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            time_zone TEXT,
            interval_seconds INTEGER,
            days_of_week TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 排除日期表，同一策略下日期唯一
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_excluded_dates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            strategy_id INTEGER NOT NULL,
            excluded_date TEXT NOT NULL,
            reason TEXT,
            UNIQUE (strategy_id, excluded_date),
            FOREIGN KEY (strategy_id) REFERENCES schedule_strategies(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 作业表；被引用的策略不能删除
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            job_type TEXT NOT NULL,
            job_config TEXT NOT NULL DEFAULT '{}',
            schedule_strategy_id INTEGER NOT NULL,
            precondition_config TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (schedule_strategy_id) REFERENCES schedule_strategies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 执行日志表，不引用作业表，作业删除后日志保留
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_execution_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            strategy_id INTEGER,
            scheduled_fire_time DATETIME NOT NULL,
            actual_fire_time DATETIME NOT NULL,
            finished_time DATETIME NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_strategies_schedule_type ON schedule_strategies(schedule_type)",
        "CREATE INDEX IF NOT EXISTS idx_excluded_dates_strategy_id ON schedule_excluded_dates(strategy_id)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_strategy_id ON scheduler_jobs(schedule_strategy_id)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_enabled ON scheduler_jobs(enabled)",
        "CREATE INDEX IF NOT EXISTS idx_jobs_job_type ON scheduler_jobs(job_type)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_job_id ON job_execution_logs(job_id)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_status ON job_execution_logs(status)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_scheduled ON job_execution_logs(scheduled_fire_time)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
