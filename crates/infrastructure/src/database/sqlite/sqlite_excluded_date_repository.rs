use async_trait::async_trait;
use chrono::NaiveDate;
use scheduler_domain::{
    entities::{ExcludedDate, ExcludedDateSpec},
    repositories::ExcludedDateRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

pub struct SqliteExcludedDateRepository {
    pool: SqlitePool,
}

impl SqliteExcludedDateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_excluded_date(row: &SqliteRow) -> SchedulerResult<ExcludedDate> {
        Ok(ExcludedDate {
            id: row.try_get("id")?,
            strategy_id: row.try_get("strategy_id")?,
            excluded_date: row.try_get("excluded_date")?,
            reason: row.try_get("reason")?,
        })
    }
}

#[async_trait]
impl ExcludedDateRepository for SqliteExcludedDateRepository {
    /// 删除与写入在同一事务中完成，任一步失败都会整体回滚
    #[instrument(skip(self, dates), fields(strategy_id = strategy_id, count = dates.len()))]
    async fn replace_for_strategy(
        &self,
        strategy_id: i64,
        dates: &[ExcludedDateSpec],
    ) -> SchedulerResult<u64> {
        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;

        sqlx::query("DELETE FROM schedule_excluded_dates WHERE strategy_id = ?")
            .bind(strategy_id)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;

        let mut inserted = 0;
        for spec in dates {
            let result = sqlx::query(
                "INSERT INTO schedule_excluded_dates (strategy_id, excluded_date, reason) VALUES (?, ?, ?)",
            )
            .bind(strategy_id)
            .bind(spec.date)
            .bind(&spec.reason)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(SchedulerError::Database)?;

        debug!("策略 {} 的排除日期已替换，写入 {} 条", strategy_id, inserted);
        Ok(inserted)
    }

    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<ExcludedDate>> {
        let rows = sqlx::query(
            "SELECT id, strategy_id, excluded_date, reason FROM schedule_excluded_dates
             WHERE strategy_id = ? ORDER BY excluded_date ASC",
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_excluded_date).collect()
    }

    async fn delete_by_strategy(&self, strategy_id: i64) -> SchedulerResult<u64> {
        let result = sqlx::query("DELETE FROM schedule_excluded_dates WHERE strategy_id = ?")
            .bind(strategy_id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected())
    }

    async fn is_excluded(&self, strategy_id: i64, date: NaiveDate) -> SchedulerResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM schedule_excluded_dates WHERE strategy_id = ? AND excluded_date = ?",
        )
        .bind(strategy_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(count > 0)
    }
}
