//! 进程内触发引擎
//!
//! 基于 tokio 定时器与 `cron` 调度迭代器实现 [`TriggerEngine`]。
//! 每个触发器对应一个定时任务；到点后在新的 tokio 任务中回调监听器，
//! 同一作业的多次触发可能并发执行。注册信息只保存在内存中，
//! 进程重启后需要重新同步。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scheduler_domain::{
    FiringContext, FiringListener, JobData, JobDefinition, JobKey, MisfirePolicy, Trigger,
    TriggerEngine, TriggerKey, TriggerSchedule,
};
use scheduler_errors::{SchedulerError, SchedulerResult};

struct RegisteredTrigger {
    generation: u64,
    trigger: Trigger,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct EngineState {
    jobs: HashMap<JobKey, JobDefinition>,
    triggers: HashMap<TriggerKey, RegisteredTrigger>,
}

type ListenerSlot = Arc<OnceLock<Arc<dyn FiringListener>>>;

/// 定时任务所需的共享句柄
#[derive(Clone)]
struct TimerContext {
    state: Arc<RwLock<EngineState>>,
    listener: ListenerSlot,
}

pub struct LocalTriggerEngine {
    state: Arc<RwLock<EngineState>>,
    listener: ListenerSlot,
    generation: AtomicU64,
}

impl LocalTriggerEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState::default())),
            listener: Arc::new(OnceLock::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// 设置触发回调，只能设置一次
    pub fn set_listener(&self, listener: Arc<dyn FiringListener>) -> SchedulerResult<()> {
        self.listener
            .set(listener)
            .map_err(|_| SchedulerError::engine_error("触发监听器已设置"))
    }

    pub async fn trigger_keys(&self) -> Vec<TriggerKey> {
        let state = self.state.read().await;
        let mut keys: Vec<TriggerKey> = state.triggers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn trigger_count(&self) -> usize {
        self.state.read().await.triggers.len()
    }

    /// 停止所有定时任务并清空注册信息
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        let count = state.triggers.len();
        for (_, registered) in state.triggers.drain() {
            registered.handle.abort();
        }
        state.jobs.clear();
        info!("触发引擎已停止，取消 {} 个触发器", count);
    }

    fn timer_context(&self) -> TimerContext {
        TimerContext {
            state: self.state.clone(),
            listener: self.listener.clone(),
        }
    }

    /// 在已持有写锁的状态中注册触发器并启动定时任务
    fn register_trigger(&self, state: &mut EngineState, trigger: &Trigger) -> SchedulerResult<()> {
        let plan = TimerPlan::from_trigger(trigger)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(run_timer(
            self.timer_context(),
            trigger.clone(),
            plan,
            generation,
        ));

        if let Some(previous) = state.triggers.insert(
            trigger.key.clone(),
            RegisteredTrigger {
                generation,
                trigger: trigger.clone(),
                handle,
            },
        ) {
            previous.handle.abort();
        }

        debug!("注册触发器 {} -> {}", trigger.key, trigger.job_key);
        Ok(())
    }

    fn ensure_job(state: &EngineState, key: &JobKey) -> SchedulerResult<()> {
        if state.jobs.contains_key(key) {
            Ok(())
        } else {
            Err(SchedulerError::engine_error(format!("作业 {key} 未注册")))
        }
    }
}

impl Default for LocalTriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerEngine for LocalTriggerEngine {
    async fn schedule(&self, definition: &JobDefinition, trigger: &Trigger) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&definition.key) {
            return Err(SchedulerError::engine_error(format!(
                "作业 {} 已存在",
                definition.key
            )));
        }
        if state.triggers.contains_key(&trigger.key) {
            return Err(SchedulerError::engine_error(format!(
                "触发器 {} 已存在",
                trigger.key
            )));
        }

        self.register_trigger(&mut state, trigger)?;
        state.jobs.insert(definition.key.clone(), definition.clone());
        Ok(())
    }

    async fn schedule_trigger(&self, trigger: &Trigger) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        Self::ensure_job(&state, &trigger.job_key)?;
        if state.triggers.contains_key(&trigger.key) {
            return Err(SchedulerError::engine_error(format!(
                "触发器 {} 已存在",
                trigger.key
            )));
        }
        self.register_trigger(&mut state, trigger)
    }

    async fn reschedule(&self, key: &TriggerKey, trigger: &Trigger) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        Self::ensure_job(&state, &trigger.job_key)?;
        if let Some(previous) = state.triggers.remove(key) {
            previous.handle.abort();
        }
        self.register_trigger(&mut state, trigger)
    }

    async fn unschedule(&self, key: &TriggerKey) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        match state.triggers.remove(key) {
            Some(registered) => {
                registered.handle.abort();
                debug!("注销触发器 {}", key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_job(
        &self,
        definition: &JobDefinition,
        replace_if_exists: bool,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&definition.key) && !replace_if_exists {
            return Err(SchedulerError::engine_error(format!(
                "作业 {} 已存在",
                definition.key
            )));
        }
        state.jobs.insert(definition.key.clone(), definition.clone());
        Ok(())
    }

    async fn delete_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let trigger_keys: Vec<TriggerKey> = state
            .triggers
            .iter()
            .filter(|(_, registered)| &registered.trigger.job_key == key)
            .map(|(trigger_key, _)| trigger_key.clone())
            .collect();
        for trigger_key in trigger_keys {
            if let Some(registered) = state.triggers.remove(&trigger_key) {
                registered.handle.abort();
            }
        }
        Ok(state.jobs.remove(key).is_some())
    }

    async fn check_exists(&self, key: &JobKey) -> SchedulerResult<bool> {
        Ok(self.state.read().await.jobs.contains_key(key))
    }
}

enum TimerPlan {
    Recurring {
        schedule: Box<Schedule>,
        zone: Option<Tz>,
    },
    Once {
        fire_at: DateTime<Utc>,
    },
}

impl TimerPlan {
    fn from_trigger(trigger: &Trigger) -> SchedulerResult<Self> {
        match &trigger.schedule {
            TriggerSchedule::Cron {
                expression,
                time_zone,
            } => {
                let schedule = Schedule::from_str(expression).map_err(|e| {
                    SchedulerError::InvalidCron {
                        expr: expression.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Self::Recurring {
                    schedule: Box::new(schedule),
                    zone: *time_zone,
                })
            }
            TriggerSchedule::Once { fire_at } => Ok(Self::Once { fire_at: *fire_at }),
        }
    }
}

/// 计算 `after` 之后的下一次触发时刻，`zone` 为空时按系统本地时区解释表达式
fn next_fire_after(
    schedule: &Schedule,
    zone: Option<Tz>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match zone {
        Some(tz) => schedule
            .after(&after.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc)),
        None => schedule
            .after(&after.with_timezone(&Local))
            .next()
            .map(|t| t.with_timezone(&Utc)),
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    if let Ok(wait) = (at - Utc::now()).to_std() {
        tokio::time::sleep(wait).await;
    }
}

async fn run_timer(context: TimerContext, trigger: Trigger, plan: TimerPlan, generation: u64) {
    match plan {
        TimerPlan::Recurring { schedule, zone } => {
            let mut last_fire: Option<DateTime<Utc>> = None;
            loop {
                let now = Utc::now();
                // 错过的触发直接跳过，从当前时刻重新计算
                let from = last_fire.map_or(now, |last| last.max(now));
                let Some(next) = next_fire_after(&schedule, zone, from) else {
                    info!("触发器 {} 没有后续触发时间", trigger.key);
                    break;
                };
                sleep_until(next).await;
                dispatch(&context, &trigger, next).await;
                last_fire = Some(next);
            }
        }
        TimerPlan::Once { fire_at } => {
            let missed = fire_at < Utc::now();
            if missed && trigger.misfire_policy == MisfirePolicy::Skip {
                warn!("一次性触发器 {} 已错过触发时间，跳过", trigger.key);
            } else {
                sleep_until(fire_at).await;
                dispatch(&context, &trigger, fire_at).await;
            }
        }
    }

    // 只移除本任务注册的触发器，避免误删被替换后的新触发器
    let mut state = context.state.write().await;
    if state
        .triggers
        .get(&trigger.key)
        .is_some_and(|registered| registered.generation == generation)
    {
        state.triggers.remove(&trigger.key);
        debug!("触发器 {} 已完成并移除", trigger.key);
    }
}

async fn dispatch(context: &TimerContext, trigger: &Trigger, scheduled_fire_time: DateTime<Utc>) {
    let data: Option<JobData> = match &trigger.data {
        Some(data) => Some(data.clone()),
        None => context
            .state
            .read()
            .await
            .jobs
            .get(&trigger.job_key)
            .map(|definition| definition.data.clone()),
    };
    let Some(data) = data else {
        warn!("触发器 {} 对应的作业 {} 不存在", trigger.key, trigger.job_key);
        return;
    };
    let Some(listener) = context.listener.get().cloned() else {
        warn!("触发器 {} 到期但未设置监听器", trigger.key);
        return;
    };

    let firing = FiringContext::from_data(
        &data,
        trigger.key.clone(),
        scheduled_fire_time,
        Utc::now(),
    );
    tokio::spawn(async move {
        let job_id = firing.job_id;
        let trigger_key = firing.trigger_key.clone();
        if let Err(e) = listener.on_fire(firing).await {
            error!("作业 {} 触发执行失败 (触发器 {}): {}", job_id, trigger_key, e);
        }
    });
}
