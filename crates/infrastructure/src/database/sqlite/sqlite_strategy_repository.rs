use async_trait::async_trait;
use scheduler_domain::{
    entities::{ScheduleStrategy, StrategyFilter},
    repositories::StrategyRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

const STRATEGY_COLUMNS: &str = "id, name, description, schedule_type, cron_expression, start_time, end_time, time_zone, interval_seconds, days_of_week, created_at, updated_at";

pub struct SqliteStrategyRepository {
    pool: SqlitePool,
}

impl SqliteStrategyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_strategy(row: &SqliteRow) -> SchedulerResult<ScheduleStrategy> {
        let days: String = row.try_get("days_of_week")?;
        Ok(ScheduleStrategy {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            schedule_type: row.try_get("schedule_type")?,
            cron_expression: row.try_get("cron_expression")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            time_zone: row.try_get("time_zone")?,
            interval_seconds: row.try_get("interval_seconds")?,
            days_of_week: days
                .split(',')
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl StrategyRepository for SqliteStrategyRepository {
    #[instrument(skip(self, strategy), fields(
        strategy_name = %strategy.name,
        schedule_type = %strategy.schedule_type.as_str(),
    ))]
    async fn create(&self, strategy: &ScheduleStrategy) -> SchedulerResult<ScheduleStrategy> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO schedule_strategies (name, description, schedule_type, cron_expression,
                                             start_time, end_time, time_zone, interval_seconds,
                                             days_of_week, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {STRATEGY_COLUMNS}
            "#
        ))
        .bind(&strategy.name)
        .bind(&strategy.description)
        .bind(strategy.schedule_type)
        .bind(&strategy.cron_expression)
        .bind(strategy.start_time)
        .bind(strategy.end_time)
        .bind(&strategy.time_zone)
        .bind(strategy.interval_seconds)
        .bind(strategy.days_of_week.join(","))
        .bind(strategy.created_at)
        .bind(strategy.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let created = Self::row_to_strategy(&row)?;
        debug!("创建{}成功", created.entity_description());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<ScheduleStrategy>> {
        let row = sqlx::query(&format!(
            "SELECT {STRATEGY_COLUMNS} FROM schedule_strategies WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_strategy).transpose()
    }

    async fn update(&self, strategy: &ScheduleStrategy) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE schedule_strategies
            SET name = ?, description = ?, schedule_type = ?, cron_expression = ?,
                start_time = ?, end_time = ?, time_zone = ?, interval_seconds = ?,
                days_of_week = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&strategy.name)
        .bind(&strategy.description)
        .bind(strategy.schedule_type)
        .bind(&strategy.cron_expression)
        .bind(strategy.start_time)
        .bind(strategy.end_time)
        .bind(&strategy.time_zone)
        .bind(strategy.interval_seconds)
        .bind(strategy.days_of_week.join(","))
        .bind(strategy.updated_at)
        .bind(strategy.id)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::StrategyNotFound { id: strategy.id });
        }

        debug!("更新调度策略成功: ID {}", strategy.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM schedule_strategies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        debug!("删除调度策略: ID {}, 影响行数 {}", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), fields(
        schedule_type = ?filter.schedule_type,
        name_pattern = ?filter.name_pattern,
        limit = ?filter.limit,
    ))]
    async fn list(&self, filter: &StrategyFilter) -> SchedulerResult<Vec<ScheduleStrategy>> {
        let mut query = format!("SELECT {STRATEGY_COLUMNS} FROM schedule_strategies WHERE 1=1");
        if filter.schedule_type.is_some() {
            query.push_str(" AND schedule_type = ?");
        }
        if filter.name_pattern.is_some() {
            query.push_str(" AND name LIKE ?");
        }
        query.push_str(" ORDER BY id ASC");
        // SQLite 要求 OFFSET 前必须有 LIMIT，-1 表示不限制
        if filter.limit.is_some() || filter.offset.is_some() {
            query.push_str(" LIMIT ? OFFSET ?");
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(schedule_type) = filter.schedule_type {
            sqlx_query = sqlx_query.bind(schedule_type);
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

        let strategies: SchedulerResult<Vec<ScheduleStrategy>> =
            rows.iter().map(Self::row_to_strategy).collect();
        let result = strategies?;
        debug!("查询调度策略列表成功，返回 {} 条", result.len());
        Ok(result)
    }
}
