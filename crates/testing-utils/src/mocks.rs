//! Mock implementations for all repository and port traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring actual database connections or a
//! running trigger engine.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scheduler_domain::entities::{
    ExcludedDate, ExcludedDateSpec, ExecutionLogFilter, ExecutionStatus, JobExecutionLog,
    JobExecutionStats, JobFilter, ScheduleStrategy, SchedulerJob, StrategyFilter,
};
use scheduler_domain::ports::{
    FiringContext, FiringListener, JobDefinition, JobHandler, JobKey, Trigger, TriggerEngine,
    TriggerKey,
};
use scheduler_domain::repositories::{
    ExcludedDateRepository, ExecutionLogRepository, JobRepository, StrategyRepository,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn matches_pattern(value: &str, pattern: &Option<String>) -> bool {
    pattern
        .as_ref()
        .map(|p| value.to_lowercase().contains(&p.to_lowercase()))
        .unwrap_or(true)
}

fn paginate<T>(items: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

/// Mock implementation of StrategyRepository for testing
#[derive(Debug, Clone)]
pub struct MockStrategyRepository {
    strategies: Arc<Mutex<HashMap<i64, ScheduleStrategy>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockStrategyRepository {
    pub fn new() -> Self {
        Self {
            strategies: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.strategies.lock().unwrap().len()
    }
}

impl Default for MockStrategyRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyRepository for MockStrategyRepository {
    async fn create(&self, strategy: &ScheduleStrategy) -> SchedulerResult<ScheduleStrategy> {
        let mut strategies = self.strategies.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = strategy.clone();
        created.id = *next_id;
        *next_id += 1;

        strategies.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<ScheduleStrategy>> {
        Ok(self.strategies.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, strategy: &ScheduleStrategy) -> SchedulerResult<()> {
        let mut strategies = self.strategies.lock().unwrap();
        if !strategies.contains_key(&strategy.id) {
            return Err(SchedulerError::strategy_not_found(strategy.id));
        }
        strategies.insert(strategy.id, strategy.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        Ok(self.strategies.lock().unwrap().remove(&id).is_some())
    }

    async fn list(&self, filter: &StrategyFilter) -> SchedulerResult<Vec<ScheduleStrategy>> {
        let strategies = self.strategies.lock().unwrap();
        let mut filtered: Vec<ScheduleStrategy> = strategies
            .values()
            .filter(|s| filter.schedule_type.map_or(true, |t| s.schedule_type == t))
            .filter(|s| matches_pattern(&s.name, &filter.name_pattern))
            .cloned()
            .collect();
        filtered.sort_by_key(|s| s.id);
        Ok(paginate(filtered, filter.limit, filter.offset))
    }
}

/// Mock implementation of ExcludedDateRepository for testing
#[derive(Debug, Clone)]
pub struct MockExcludedDateRepository {
    dates: Arc<Mutex<Vec<ExcludedDate>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockExcludedDateRepository {
    pub fn new() -> Self {
        Self {
            dates: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.dates.lock().unwrap().len()
    }
}

impl Default for MockExcludedDateRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExcludedDateRepository for MockExcludedDateRepository {
    async fn replace_for_strategy(
        &self,
        strategy_id: i64,
        dates: &[ExcludedDateSpec],
    ) -> SchedulerResult<u64> {
        let mut stored = self.dates.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        stored.retain(|d| d.strategy_id != strategy_id);
        for spec in dates {
            stored.push(ExcludedDate {
                id: *next_id,
                strategy_id,
                excluded_date: spec.date,
                reason: spec.reason.clone(),
            });
            *next_id += 1;
        }
        Ok(dates.len() as u64)
    }

    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<ExcludedDate>> {
        let stored = self.dates.lock().unwrap();
        let mut dates: Vec<ExcludedDate> = stored
            .iter()
            .filter(|d| d.strategy_id == strategy_id)
            .cloned()
            .collect();
        dates.sort_by_key(|d| d.excluded_date);
        Ok(dates)
    }

    async fn delete_by_strategy(&self, strategy_id: i64) -> SchedulerResult<u64> {
        let mut stored = self.dates.lock().unwrap();
        let before = stored.len();
        stored.retain(|d| d.strategy_id != strategy_id);
        Ok((before - stored.len()) as u64)
    }

    async fn is_excluded(&self, strategy_id: i64, date: NaiveDate) -> SchedulerResult<bool> {
        let stored = self.dates.lock().unwrap();
        Ok(stored
            .iter()
            .any(|d| d.strategy_id == strategy_id && d.excluded_date == date))
    }
}

/// Mock implementation of JobRepository for testing
#[derive(Debug, Clone)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, SchedulerJob>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &SchedulerJob) -> SchedulerResult<SchedulerJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = job.clone();
        created.id = *next_id;
        *next_id += 1;

        jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<SchedulerJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, job: &SchedulerJob) -> SchedulerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(SchedulerError::job_not_found(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        Ok(self.jobs.lock().unwrap().remove(&id).is_some())
    }

    async fn list(&self, filter: &JobFilter) -> SchedulerResult<Vec<SchedulerJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut filtered: Vec<SchedulerJob> = jobs
            .values()
            .filter(|j| filter.enabled.map_or(true, |e| j.enabled == e))
            .filter(|j| {
                filter
                    .job_type
                    .as_ref()
                    .map_or(true, |t| &j.job_type == t)
            })
            .filter(|j| {
                filter
                    .strategy_id
                    .map_or(true, |s| j.schedule_strategy_id == s)
            })
            .filter(|j| matches_pattern(&j.name, &filter.name_pattern))
            .cloned()
            .collect();
        filtered.sort_by_key(|j| j.id);
        Ok(paginate(filtered, filter.limit, filter.offset))
    }

    async fn get_by_strategy(&self, strategy_id: i64) -> SchedulerResult<Vec<SchedulerJob>> {
        self.list(&JobFilter {
            strategy_id: Some(strategy_id),
            ..Default::default()
        })
        .await
    }

    async fn count_by_strategy(&self, strategy_id: i64) -> SchedulerResult<i64> {
        Ok(self.get_by_strategy(strategy_id).await?.len() as i64)
    }
}

/// Mock implementation of ExecutionLogRepository for testing
#[derive(Debug, Clone)]
pub struct MockExecutionLogRepository {
    logs: Arc<Mutex<Vec<JobExecutionLog>>>,
    next_id: Arc<Mutex<i64>>,
    fail_appends: Arc<AtomicBool>,
}

impl MockExecutionLogRepository {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// All appended logs in insertion order
    pub fn logs(&self) -> Vec<JobExecutionLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockExecutionLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLogRepository for MockExecutionLogRepository {
    async fn append(&self, log: &JobExecutionLog) -> SchedulerResult<JobExecutionLog> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SchedulerError::database_error("mock append failure"));
        }

        let mut logs = self.logs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut appended = log.clone();
        appended.id = *next_id;
        *next_id += 1;

        logs.push(appended.clone());
        Ok(appended)
    }

    async fn list(&self, filter: &ExecutionLogFilter) -> SchedulerResult<Vec<JobExecutionLog>> {
        let logs = self.logs.lock().unwrap();
        let mut filtered: Vec<JobExecutionLog> = logs
            .iter()
            .filter(|l| filter.job_id.map_or(true, |id| l.job_id == id))
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.from.map_or(true, |from| l.scheduled_fire_time >= from))
            .filter(|l| filter.to.map_or(true, |to| l.scheduled_fire_time <= to))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            b.scheduled_fire_time
                .cmp(&a.scheduled_fire_time)
                .then(b.id.cmp(&a.id))
        });
        Ok(paginate(filtered, filter.limit, filter.offset))
    }

    async fn stats(
        &self,
        job_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> SchedulerResult<JobExecutionStats> {
        let logs = self.logs.lock().unwrap();
        let runs: Vec<&JobExecutionLog> = logs
            .iter()
            .filter(|l| l.job_id == job_id)
            .filter(|l| since.map_or(true, |s| l.scheduled_fire_time >= s))
            .collect();

        let count = |status: ExecutionStatus| runs.iter().filter(|l| l.status == status).count() as i64;
        let average_duration_ms = if runs.is_empty() {
            None
        } else {
            Some(runs.iter().map(|l| l.duration_ms as f64).sum::<f64>() / runs.len() as f64)
        };

        Ok(JobExecutionStats {
            job_id,
            total_runs: runs.len() as i64,
            successful_runs: count(ExecutionStatus::Success),
            failed_runs: count(ExecutionStatus::Failed),
            retried_runs: count(ExecutionStatus::Retried),
            skipped_runs: count(ExecutionStatus::Skipped),
            average_duration_ms,
            last_fire_time: runs.iter().map(|l| l.scheduled_fire_time).max(),
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|l| l.scheduled_fire_time >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct EngineState {
    jobs: HashMap<JobKey, JobDefinition>,
    triggers: HashMap<TriggerKey, Trigger>,
    calls: Vec<String>,
}

/// Mock trigger engine that records every registration without firing anything
///
/// Individual operations (or all of them) can be made to fail to exercise
/// error paths.
#[derive(Debug, Clone, Default)]
pub struct MockTriggerEngine {
    state: Arc<Mutex<EngineState>>,
    failing_operations: Arc<Mutex<HashSet<String>>>,
    fail_all: Arc<AtomicBool>,
}

impl MockTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Make a single operation (e.g. `"schedule_trigger"`) fail
    pub fn fail_operation(&self, operation: &str) {
        self.failing_operations
            .lock()
            .unwrap()
            .insert(operation.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn has_job(&self, job_id: i64) -> bool {
        self.state
            .lock()
            .unwrap()
            .jobs
            .contains_key(&JobKey::for_job(job_id))
    }

    pub fn job_definition(&self, job_id: i64) -> Option<JobDefinition> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&JobKey::for_job(job_id))
            .cloned()
    }

    pub fn trigger_for_job(&self, job_id: i64) -> Option<Trigger> {
        self.state
            .lock()
            .unwrap()
            .triggers
            .get(&TriggerKey::for_job(job_id))
            .cloned()
    }

    pub fn retry_triggers(&self) -> Vec<Trigger> {
        let state = self.state.lock().unwrap();
        let mut triggers: Vec<Trigger> = state
            .triggers
            .values()
            .filter(|t| t.key.is_retry())
            .cloned()
            .collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        triggers
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn trigger_count(&self) -> usize {
        self.state.lock().unwrap().triggers.len()
    }

    fn enter(&self, operation: &str, key: &str) -> SchedulerResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("{operation}:{key}"));

        if self.fail_all.load(Ordering::SeqCst)
            || self.failing_operations.lock().unwrap().contains(operation)
        {
            return Err(SchedulerError::engine_error(format!(
                "mock engine failure in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerEngine for MockTriggerEngine {
    async fn schedule(&self, definition: &JobDefinition, trigger: &Trigger) -> SchedulerResult<()> {
        self.enter("schedule", definition.key.as_str())?;
        let mut state = self.state.lock().unwrap();
        if state.jobs.contains_key(&definition.key) {
            return Err(SchedulerError::engine_error(format!(
                "job {} already exists",
                definition.key
            )));
        }
        state.jobs.insert(definition.key.clone(), definition.clone());
        state.triggers.insert(trigger.key.clone(), trigger.clone());
        Ok(())
    }

    async fn schedule_trigger(&self, trigger: &Trigger) -> SchedulerResult<()> {
        self.enter("schedule_trigger", trigger.key.as_str())?;
        let mut state = self.state.lock().unwrap();
        if !state.jobs.contains_key(&trigger.job_key) {
            return Err(SchedulerError::engine_error(format!(
                "job {} does not exist",
                trigger.job_key
            )));
        }
        if state.triggers.contains_key(&trigger.key) {
            return Err(SchedulerError::engine_error(format!(
                "trigger {} already exists",
                trigger.key
            )));
        }
        state.triggers.insert(trigger.key.clone(), trigger.clone());
        Ok(())
    }

    async fn reschedule(&self, key: &TriggerKey, trigger: &Trigger) -> SchedulerResult<()> {
        self.enter("reschedule", key.as_str())?;
        let mut state = self.state.lock().unwrap();
        if !state.jobs.contains_key(&trigger.job_key) {
            return Err(SchedulerError::engine_error(format!(
                "job {} does not exist",
                trigger.job_key
            )));
        }
        state.triggers.remove(key);
        state.triggers.insert(trigger.key.clone(), trigger.clone());
        Ok(())
    }

    async fn unschedule(&self, key: &TriggerKey) -> SchedulerResult<bool> {
        self.enter("unschedule", key.as_str())?;
        Ok(self.state.lock().unwrap().triggers.remove(key).is_some())
    }

    async fn add_job(
        &self,
        definition: &JobDefinition,
        replace_if_exists: bool,
    ) -> SchedulerResult<()> {
        self.enter("add_job", definition.key.as_str())?;
        let mut state = self.state.lock().unwrap();
        if state.jobs.contains_key(&definition.key) && !replace_if_exists {
            return Err(SchedulerError::engine_error(format!(
                "job {} already exists",
                definition.key
            )));
        }
        state.jobs.insert(definition.key.clone(), definition.clone());
        Ok(())
    }

    async fn delete_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        self.enter("delete_job", key.as_str())?;
        let mut state = self.state.lock().unwrap();
        state.triggers.retain(|_, t| &t.job_key != key);
        Ok(state.jobs.remove(key).is_some())
    }

    async fn check_exists(&self, key: &JobKey) -> SchedulerResult<bool> {
        self.enter("check_exists", key.as_str())?;
        Ok(self.state.lock().unwrap().jobs.contains_key(key))
    }
}

/// Job handler that records every invocation and optionally fails
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<FiringContext>>>,
    failure: Option<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<FiringContext> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, _job: &SchedulerJob, context: &FiringContext) -> SchedulerResult<()> {
        self.calls.lock().unwrap().push(context.clone());
        match &self.failure {
            Some(message) => Err(SchedulerError::execution_error(message.clone())),
            None => Ok(()),
        }
    }
}

/// Firing listener that forwards every firing to a channel
pub struct RecordingListener {
    sender: mpsc::UnboundedSender<FiringContext>,
    fail: bool,
}

impl RecordingListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiringContext>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, fail: false }, receiver)
    }

    /// Records firings but reports every one of them as failed
    pub fn failing() -> (Self, mpsc::UnboundedReceiver<FiringContext>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, fail: true }, receiver)
    }
}

#[async_trait]
impl FiringListener for RecordingListener {
    async fn on_fire(&self, context: FiringContext) -> SchedulerResult<()> {
        let _ = self.sender.send(context);
        if self.fail {
            return Err(SchedulerError::execution_error("listener failure"));
        }
        Ok(())
    }
}
