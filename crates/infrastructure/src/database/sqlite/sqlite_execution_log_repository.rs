use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    entities::{ExecutionLogFilter, JobExecutionLog, JobExecutionStats},
    repositories::ExecutionLogRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

const LOG_COLUMNS: &str = "id, job_id, strategy_id, scheduled_fire_time, actual_fire_time, finished_time, status, error_message, retry_count, duration_ms";

/// 执行日志直接写连接池（自动提交），与处理器内部的事务互不影响
pub struct SqliteExecutionLogRepository {
    pool: SqlitePool,
}

impl SqliteExecutionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &SqliteRow) -> SchedulerResult<JobExecutionLog> {
        Ok(JobExecutionLog {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            strategy_id: row.try_get("strategy_id")?,
            scheduled_fire_time: row.try_get("scheduled_fire_time")?,
            actual_fire_time: row.try_get("actual_fire_time")?,
            finished_time: row.try_get("finished_time")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            duration_ms: row.try_get("duration_ms")?,
        })
    }
}

#[async_trait]
impl ExecutionLogRepository for SqliteExecutionLogRepository {
    #[instrument(skip(self, log), fields(
        job_id = log.job_id,
        status = %log.status.as_str(),
        retry_count = log.retry_count,
    ))]
    async fn append(&self, log: &JobExecutionLog) -> SchedulerResult<JobExecutionLog> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO job_execution_logs (job_id, strategy_id, scheduled_fire_time, actual_fire_time,
                                            finished_time, status, error_message, retry_count, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(log.job_id)
        .bind(log.strategy_id)
        .bind(log.scheduled_fire_time)
        .bind(log.actual_fire_time)
        .bind(log.finished_time)
        .bind(log.status)
        .bind(&log.error_message)
        .bind(log.retry_count)
        .bind(log.duration_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let appended = Self::row_to_log(&row)?;
        debug!("写入{}", appended.entity_description());
        Ok(appended)
    }

    #[instrument(skip(self, filter), fields(
        job_id = ?filter.job_id,
        status = ?filter.status,
        limit = ?filter.limit,
    ))]
    async fn list(&self, filter: &ExecutionLogFilter) -> SchedulerResult<Vec<JobExecutionLog>> {
        let mut query = format!("SELECT {LOG_COLUMNS} FROM job_execution_logs WHERE 1=1");
        if filter.job_id.is_some() {
            query.push_str(" AND job_id = ?");
        }
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        if filter.from.is_some() {
            query.push_str(" AND scheduled_fire_time >= ?");
        }
        if filter.to.is_some() {
            query.push_str(" AND scheduled_fire_time <= ?");
        }
        query.push_str(" ORDER BY scheduled_fire_time DESC, id DESC");
        if filter.limit.is_some() || filter.offset.is_some() {
            query.push_str(" LIMIT ? OFFSET ?");
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(job_id) = filter.job_id {
            sqlx_query = sqlx_query.bind(job_id);
        }
        if let Some(status) = filter.status {
            sqlx_query = sqlx_query.bind(status);
        }
        if let Some(from) = filter.from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = filter.to {
            sqlx_query = sqlx_query.bind(to);
        }
        if filter.limit.is_some() || filter.offset.is_some() {
            sqlx_query = sqlx_query
                .bind(filter.limit.unwrap_or(-1))
                .bind(filter.offset.unwrap_or(0));
        }

        let rows = sqlx_query
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_log).collect()
    }

    async fn stats(
        &self,
        job_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> SchedulerResult<JobExecutionStats> {
        let mut query = String::from(
            r#"
            SELECT
                COUNT(*) as total_runs,
                COUNT(CASE WHEN status = 'SUCCESS' THEN 1 END) as successful_runs,
                COUNT(CASE WHEN status = 'FAILED' THEN 1 END) as failed_runs,
                COUNT(CASE WHEN status = 'RETRIED' THEN 1 END) as retried_runs,
                COUNT(CASE WHEN status = 'SKIPPED' THEN 1 END) as skipped_runs,
                AVG(duration_ms) as avg_duration_ms,
                MAX(scheduled_fire_time) as last_fire_time
            FROM job_execution_logs
            WHERE job_id = ?
            "#,
        );
        if since.is_some() {
            query.push_str(" AND scheduled_fire_time >= ?");
        }

        let mut sqlx_query = sqlx::query(&query).bind(job_id);
        if let Some(since) = since {
            sqlx_query = sqlx_query.bind(since);
        }

        let row = sqlx_query
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        Ok(JobExecutionStats {
            job_id,
            total_runs: row.try_get("total_runs")?,
            successful_runs: row.try_get("successful_runs")?,
            failed_runs: row.try_get("failed_runs")?,
            retried_runs: row.try_get("retried_runs")?,
            skipped_runs: row.try_get("skipped_runs")?,
            average_duration_ms: row.try_get("avg_duration_ms")?,
            last_fire_time: row.try_get("last_fire_time")?,
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let result = sqlx::query("DELETE FROM job_execution_logs WHERE scheduled_fire_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let deleted_count = result.rows_affected();
        debug!("清理了 {} 条过期执行日志", deleted_count);
        Ok(deleted_count)
    }
}
