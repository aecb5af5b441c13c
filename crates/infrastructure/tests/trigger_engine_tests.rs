use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use scheduler_domain::{
    JobData, JobDefinition, JobKey, MisfirePolicy, Trigger, TriggerEngine, TriggerKey,
    TriggerSchedule,
};
use scheduler_infrastructure::LocalTriggerEngine;
use scheduler_testing_utils::RecordingListener;

fn definition(job_id: i64) -> JobDefinition {
    JobDefinition {
        key: JobKey::for_job(job_id),
        job_type: "log".to_string(),
        data: JobData {
            job_id,
            strategy_id: Some(10),
            retry_count: 0,
        },
    }
}

fn every_second(job_id: i64) -> Trigger {
    Trigger::recurring(job_id, "* * * * * *".to_string(), Some(chrono_tz::UTC))
}

fn one_shot(job_id: i64, offset_ms: i64, policy: MisfirePolicy, retry_count: u32) -> Trigger {
    let now = Utc::now();
    Trigger {
        key: TriggerKey::retry(job_id, now),
        job_key: JobKey::for_job(job_id),
        schedule: TriggerSchedule::Once {
            fire_at: now + chrono::Duration::milliseconds(offset_ms),
        },
        misfire_policy: policy,
        data: Some(JobData {
            job_id,
            strategy_id: Some(10),
            retry_count,
        }),
    }
}

fn engine_with_listener() -> (
    LocalTriggerEngine,
    tokio::sync::mpsc::UnboundedReceiver<scheduler_domain::FiringContext>,
) {
    let engine = LocalTriggerEngine::new();
    let (listener, rx) = RecordingListener::new();
    engine.set_listener(Arc::new(listener)).unwrap();
    (engine, rx)
}

async fn wait_for_trigger_count(engine: &LocalTriggerEngine, expected: usize) {
    for _ in 0..50 {
        if engine.trigger_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("trigger count never reached {expected}");
}

#[tokio::test]
async fn test_recurring_trigger_fires_with_definition_data() {
    let (engine, mut rx) = engine_with_listener();
    engine.schedule(&definition(1), &every_second(1)).await.unwrap();

    let firing = timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("recurring trigger did not fire")
        .unwrap();

    assert_eq!(firing.job_id, 1);
    assert_eq!(firing.strategy_id, Some(10));
    assert_eq!(firing.retry_count, 0);
    assert_eq!(firing.trigger_key, TriggerKey::for_job(1));
    assert!(firing.actual_fire_time >= firing.scheduled_fire_time);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_listener_errors_do_not_stop_trigger() {
    let engine = LocalTriggerEngine::new();
    let (listener, mut rx) = RecordingListener::failing();
    engine.set_listener(Arc::new(listener)).unwrap();
    engine.schedule(&definition(2), &every_second(2)).await.unwrap();

    for _ in 0..2 {
        timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("trigger stopped after listener failure")
            .unwrap();
    }

    engine.shutdown().await;
}

#[tokio::test]
async fn test_past_one_shot_with_fire_now_fires_immediately_and_removes_itself() {
    let (engine, mut rx) = engine_with_listener();
    engine.add_job(&definition(3), false).await.unwrap();

    let trigger = one_shot(3, -5_000, MisfirePolicy::FireNow, 2);
    engine.schedule_trigger(&trigger).await.unwrap();

    let firing = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("one-shot trigger did not fire")
        .unwrap();
    assert_eq!(firing.retry_count, 2);
    assert_eq!(firing.trigger_key, trigger.key);

    wait_for_trigger_count(&engine, 0).await;
    assert!(engine.check_exists(&JobKey::for_job(3)).await.unwrap());
}

#[tokio::test]
async fn test_past_one_shot_with_skip_is_dropped() {
    let (engine, mut rx) = engine_with_listener();
    engine.add_job(&definition(4), false).await.unwrap();

    engine
        .schedule_trigger(&one_shot(4, -5_000, MisfirePolicy::Skip, 1))
        .await
        .unwrap();

    wait_for_trigger_count(&engine, 0).await;
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_unschedule_stops_firing() {
    let (engine, mut rx) = engine_with_listener();
    engine.schedule(&definition(5), &every_second(5)).await.unwrap();

    assert!(engine.unschedule(&TriggerKey::for_job(5)).await.unwrap());
    assert!(!engine.unschedule(&TriggerKey::for_job(5)).await.unwrap());
    assert_eq!(engine.trigger_count().await, 0);

    assert!(timeout(Duration::from_millis(1_500), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_registration_rules() {
    let (engine, _rx) = engine_with_listener();

    engine.schedule(&definition(6), &every_second(6)).await.unwrap();
    assert!(engine
        .schedule(&definition(6), &every_second(6))
        .await
        .is_err());
    assert!(engine.add_job(&definition(6), false).await.is_err());
    engine.add_job(&definition(6), true).await.unwrap();

    // 未注册作业不能追加触发器
    let orphan = one_shot(7, 60_000, MisfirePolicy::FireNow, 1);
    assert!(engine.schedule_trigger(&orphan).await.is_err());
    assert!(engine.reschedule(&orphan.key, &orphan).await.is_err());

    engine
        .reschedule(&TriggerKey::for_job(6), &every_second(6))
        .await
        .unwrap();
    assert_eq!(engine.trigger_keys().await, vec![TriggerKey::for_job(6)]);

    engine.shutdown().await;
    assert_eq!(engine.trigger_count().await, 0);
    assert!(!engine.check_exists(&JobKey::for_job(6)).await.unwrap());
}

#[tokio::test]
async fn test_delete_job_removes_all_triggers() {
    let (engine, _rx) = engine_with_listener();
    engine.schedule(&definition(8), &every_second(8)).await.unwrap();
    engine
        .schedule_trigger(&one_shot(8, 60_000, MisfirePolicy::FireNow, 1))
        .await
        .unwrap();
    assert_eq!(engine.trigger_count().await, 2);

    assert!(engine.delete_job(&JobKey::for_job(8)).await.unwrap());
    assert_eq!(engine.trigger_count().await, 0);
    assert!(!engine.check_exists(&JobKey::for_job(8)).await.unwrap());
    assert!(!engine.delete_job(&JobKey::for_job(8)).await.unwrap());
}

#[tokio::test]
async fn test_invalid_cron_is_rejected() {
    let (engine, _rx) = engine_with_listener();
    let trigger = Trigger::recurring(9, "every day please".to_string(), None);

    let err = engine.schedule(&definition(9), &trigger).await.unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!engine.check_exists(&JobKey::for_job(9)).await.unwrap());
}

#[tokio::test]
async fn test_listener_can_only_be_set_once() {
    let (engine, _rx) = engine_with_listener();
    let (another, _rx2) = RecordingListener::new();
    assert!(engine.set_listener(Arc::new(another)).is_err());
}
