use async_trait::async_trait;
use scheduler_domain::{
    entities::{JobFilter, SchedulerJob},
    repositories::JobRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

const JOB_COLUMNS: &str = "id, name, description, job_type, job_config, schedule_strategy_id, precondition_config, enabled, created_at, updated_at";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> SchedulerResult<SchedulerJob> {
        let job_config: String = row.try_get("job_config")?;
        let precondition_config: Option<String> = row.try_get("precondition_config")?;

        Ok(SchedulerJob {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            job_type: row.try_get("job_type")?,
            job_config: serde_json::from_str(&job_config)?,
            schedule_strategy_id: row.try_get("schedule_strategy_id")?,
            precondition_config: precondition_config
                .map(|c| serde_json::from_str(&c))
                .transpose()?,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn encode_precondition(job: &SchedulerJob) -> SchedulerResult<Option<String>> {
        Ok(job
            .precondition_config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?)
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(
        job_name = %job.name,
        job_type = %job.job_type,
        strategy_id = job.schedule_strategy_id,
    ))]
    async fn create(&self, job: &SchedulerJob) -> SchedulerResult<SchedulerJob> {
        let job_config = serde_json::to_string(&job.job_config)?;
        let precondition = Self::encode_precondition(job)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO scheduler_jobs (name, description, job_type, job_config, schedule_strategy_id,
                                        precondition_config, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.job_type)
        .bind(job_config)
        .bind(job.schedule_strategy_id)
        .bind(precondition)
        .bind(job.enabled)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let created = Self::row_to_job(&row)?;
        debug!("创建{}成功", created.entity_description());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<SchedulerJob>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM scheduler_jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn update(&self, job: &SchedulerJob) -> SchedulerResult<()> {
        let job_config = serde_json::to_string(&job.job_config)?;
        let precondition = Self::encode_precondition(job)?;

        let result = sqlx::query(
            r#"
            UPDATE scheduler_jobs
            SET name = ?, description = ?, job_type = ?, job_config = ?, schedule_strategy_id = ?,
                precondition_config = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.job_type)
        .bind(job_config)
        .bind(job.schedule_strategy_id)
        .bind(precondition)
        .bind(job.enabled)
        .bind(job.updated_at)
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }

        debug!("更新作业成功: ID {}", job.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM scheduler_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        debug!("删除作业: ID {}, 影响行数 {}", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), fields(
        enabled = ?filter.enabled,
        job_type = ?filter.job_type,
        strategy_id = ?filter.strategy_id,
        limit = ?filter.limit,
    ))]
    async fn list(&self, filter: &JobFilter) -> SchedulerResult<Vec<SchedulerJob>> {
        let mut query = format!("SELECT {JOB_COLUMNS} FROM scheduler_jobs WHERE 1=1");
        if filter.enabled.is_some() {
            query.push_str(" AND enabled = ?");
        }
        if filter.job_type.is_some() {
            query.push_str(" AND job_type = ?");
        }
        if filter.strategy_id.is_some() {
            query.push_str(" AND schedule_strategy_id = ?");
        }
        if filter.name_pattern.is_some() {
            query.push_str(" AND name LIKE ?");
        }
        query.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() || filter.offset.is_some() {
            query.push_str(" LIMIT ? OFFSET ?");
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(enabled) = filter.enabled {
            sqlx_query = sqlx_query.bind(enabled);
        }
        if let Some(job_type) = &filter.job_type {
            sqlx_query = sqlx_query.bind(job_type);
        }
        if let Some(strategy_id) = filter.strategy_id {
            sqlx_query = sqlx_query.bind(strategy_id);
        }
        if let Some(name_pattern) = &filter.name_pattern {
            sqlx_query = sqlx_query.bind(format!("%{name_pattern}%"));
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

        let jobs: SchedulerResult<Vec<SchedulerJob>> = rows.iter().map(Self::row_to_job).collect();
        let result = jobs?;
        debug!("查询作业列表成功，返回 {} 个作业", result.len());
        Ok(result)
    }

    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<SchedulerJob>> {
        self.list(&JobFilter {
            strategy_id: Some(strategy_id),
            ..Default::default()
        })
        .await
    }

    async fn count_by_strategy(&self, strategy_id: i64) -> SchedulerResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduler_jobs WHERE schedule_strategy_id = ?")
                .bind(strategy_id)
                .fetch_one(&self.pool)
                .await
                .map_err(SchedulerError::Database)?;

        Ok(count)
    }
}
