use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, instrument};

use scheduler_domain::{
    ExcludedDate, ExcludedDateRepository, ExcludedDateSpec, JobRepository, ScheduleStrategy,
    StrategyFilter, StrategyRepository, StrategySpec,
};
use scheduler_errors::{SchedulerError, SchedulerResult};

use crate::cron_utils::{
    date_in_zone, normalize_days_of_week, resolve_cron_expression, resolve_time_zone,
    CronScheduler,
};
use crate::job_registry::JobRegistry;

/// 调度策略服务：维护策略、推导表达式与排除日期
pub struct StrategyService {
    strategy_repo: Arc<dyn StrategyRepository>,
    excluded_date_repo: Arc<dyn ExcludedDateRepository>,
    job_repo: Arc<dyn JobRepository>,
    job_registry: Arc<JobRegistry>,
    default_time_zone: Option<Tz>,
}

impl StrategyService {
    pub fn new(
        strategy_repo: Arc<dyn StrategyRepository>,
        excluded_date_repo: Arc<dyn ExcludedDateRepository>,
        job_repo: Arc<dyn JobRepository>,
        job_registry: Arc<JobRegistry>,
        default_time_zone: Option<Tz>,
    ) -> Self {
        Self {
            strategy_repo,
            excluded_date_repo,
            job_repo,
            job_registry,
            default_time_zone,
        }
    }

    #[instrument(skip(self, spec), fields(strategy.name = %spec.name))]
    pub async fn create_strategy(&self, spec: StrategySpec) -> SchedulerResult<ScheduleStrategy> {
        let mut strategy = ScheduleStrategy::from_spec(spec);
        Self::prepare(&mut strategy)?;

        let created = self.strategy_repo.create(&strategy).await?;
        info!(
            "创建{}，表达式: {}",
            created.entity_description(),
            created.cron_expression
        );
        Ok(created)
    }

    /// 重新推导表达式并同步所有引用该策略的作业
    #[instrument(skip(self, spec), fields(strategy.id = id))]
    pub async fn update_strategy(
        &self,
        id: i64,
        spec: StrategySpec,
    ) -> SchedulerResult<ScheduleStrategy> {
        let mut strategy = self.get_strategy(id).await?;
        strategy.apply_spec(spec);
        Self::prepare(&mut strategy)?;

        self.strategy_repo.update(&strategy).await?;
        let synced = self.job_registry.reschedule_jobs_for_strategy(id).await?;

        info!(
            "更新{}，表达式: {}，重新同步 {} 个作业",
            strategy.entity_description(),
            strategy.cron_expression,
            synced
        );
        Ok(strategy)
    }

    /// 仍被作业引用的策略不能删除
    #[instrument(skip(self), fields(strategy.id = id))]
    pub async fn delete_strategy(&self, id: i64) -> SchedulerResult<()> {
        let strategy = self.get_strategy(id).await?;

        let referenced = self.job_repo.count_by_strategy(id).await?;
        if referenced > 0 {
            return Err(SchedulerError::state_error(format!(
                "{}仍被 {} 个作业引用，无法删除",
                strategy.entity_description(),
                referenced
            )));
        }

        self.excluded_date_repo.delete_by_strategy(id).await?;
        self.strategy_repo.delete(id).await?;

        info!("删除{}", strategy.entity_description());
        Ok(())
    }

    pub async fn get_strategy(&self, id: i64) -> SchedulerResult<ScheduleStrategy> {
        self.strategy_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| SchedulerError::strategy_not_found(id))
    }

    pub async fn list_strategies(
        &self,
        filter: &StrategyFilter,
    ) -> SchedulerResult<Vec<ScheduleStrategy>> {
        self.strategy_repo.list(filter).await
    }

    /// 用给定集合整体替换策略的排除日期，按日期去重（保留首次出现的原因）
    ///
    /// 空集合表示清空。
    pub async fn sync_excluded_dates(
        &self,
        strategy_id: i64,
        dates: Vec<ExcludedDateSpec>,
    ) -> SchedulerResult<Vec<ExcludedDate>> {
        self.get_strategy(strategy_id).await?;

        let mut distinct = BTreeMap::new();
        for spec in dates {
            distinct.entry(spec.date).or_insert(spec);
        }
        let distinct: Vec<ExcludedDateSpec> = distinct.into_values().collect();

        let written = self
            .excluded_date_repo
            .replace_for_strategy(strategy_id, &distinct)
            .await?;
        info!("策略 {} 的排除日期已替换为 {} 条", strategy_id, written);

        self.excluded_date_repo.get_by_strategy(strategy_id).await
    }

    pub async fn list_excluded_dates(&self, strategy_id: i64) -> SchedulerResult<Vec<ExcludedDate>> {
        self.get_strategy(strategy_id).await?;
        self.excluded_date_repo.get_by_strategy(strategy_id).await
    }

    /// 预览 `from` 之后的触发时间，跳过排除日期
    pub async fn preview_fire_times(
        &self,
        strategy_id: i64,
        from: DateTime<Utc>,
        count: usize,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        let strategy = self.get_strategy(strategy_id).await?;
        let expression = resolve_cron_expression(&strategy)?;
        let zone = resolve_time_zone(strategy.time_zone.as_deref(), self.default_time_zone)?;
        let excluded: Vec<_> = self
            .excluded_date_repo
            .get_by_strategy(strategy_id)
            .await?
            .into_iter()
            .map(|d| d.excluded_date)
            .collect();

        let scheduler = CronScheduler::new(&expression)?;
        Ok(scheduler
            .upcoming_in_zone(zone, from)
            .filter(|t| !excluded.contains(&date_in_zone(zone, *t)))
            .take(count)
            .collect())
    }

    /// 规范化输入并推导表达式
    fn prepare(strategy: &mut ScheduleStrategy) -> SchedulerResult<()> {
        strategy.name = strategy.name.trim().to_string();
        if strategy.name.is_empty() {
            return Err(SchedulerError::validation_error("策略名称不能为空"));
        }
        strategy.days_of_week = normalize_days_of_week(&strategy.days_of_week)?;
        strategy.time_zone = strategy
            .time_zone
            .take()
            .map(|tz| tz.trim().to_string())
            .filter(|tz| !tz.is_empty());
        resolve_time_zone(strategy.time_zone.as_deref(), None)?;

        strategy.cron_expression = resolve_cron_expression(strategy)?;
        Ok(())
    }
}
