use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use scheduler_domain::{
    ExcludedDateRepository, ExcludedDateSpec, ScheduleType, StrategyFilter, StrategyRepository,
    TriggerSchedule,
};
use scheduler_dispatcher::{JobRegistry, StrategyService};
use scheduler_testing_utils::{
    JobSpecBuilder, MockExcludedDateRepository, MockJobRepository, MockStrategyRepository,
    MockTriggerEngine, StrategySpecBuilder,
};

struct Fixture {
    strategy_repo: Arc<MockStrategyRepository>,
    excluded_repo: Arc<MockExcludedDateRepository>,
    engine: MockTriggerEngine,
    registry: Arc<JobRegistry>,
    service: StrategyService,
}

fn fixture() -> Fixture {
    let strategy_repo = Arc::new(MockStrategyRepository::new());
    let excluded_repo = Arc::new(MockExcludedDateRepository::new());
    let job_repo = Arc::new(MockJobRepository::new());
    let engine = MockTriggerEngine::new();

    let registry = Arc::new(JobRegistry::new(
        job_repo.clone(),
        strategy_repo.clone(),
        Arc::new(engine.clone()),
        Some(chrono_tz::UTC),
    ));
    let service = StrategyService::new(
        strategy_repo.clone(),
        excluded_repo.clone(),
        job_repo,
        registry.clone(),
        Some(chrono_tz::UTC),
    );

    Fixture {
        strategy_repo,
        excluded_repo,
        engine,
        registry,
        service,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_create_strategy_persists_resolved_expression() {
    let f = fixture();

    let fixed = f
        .service
        .create_strategy(StrategySpecBuilder::new().fixed_rate(300).build())
        .await
        .unwrap();
    assert_eq!(fixed.cron_expression, "0 */5 * * * *");

    let daily = f
        .service
        .create_strategy(StrategySpecBuilder::new().daily(8, 30, 0).build())
        .await
        .unwrap();
    assert_eq!(daily.cron_expression, "0 30 8 * * *");

    let weekly = f
        .service
        .create_strategy(
            StrategySpecBuilder::new()
                .weekly(9, 0, &["mon", " wed ", "FRI"])
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(weekly.cron_expression, "0 0 9 * * MON,WED,FRI");
    assert_eq!(weekly.days_of_week, vec!["MON", "WED", "FRI"]);

    let stored = f.strategy_repo.get_by_id(weekly.id).await.unwrap().unwrap();
    assert_eq!(stored.cron_expression, "0 0 9 * * MON,WED,FRI");
    assert_eq!(f.strategy_repo.count(), 3);
}

#[tokio::test]
async fn test_create_strategy_rejects_incomplete_definitions() {
    let f = fixture();

    let missing_interval = f
        .service
        .create_strategy(StrategySpecBuilder::new().fixed_rate(0).build())
        .await
        .unwrap_err();
    assert!(missing_interval.is_configuration_error());

    let no_days = StrategySpecBuilder::new().weekly(9, 0, &[" ", ""]).build();
    let err = f.service.create_strategy(no_days).await.unwrap_err();
    assert!(err.is_configuration_error());

    let err = f
        .service
        .create_strategy(StrategySpecBuilder::new().cron("not a cron").build())
        .await
        .unwrap_err();
    assert!(err.is_configuration_error());

    let err = f
        .service
        .create_strategy(
            StrategySpecBuilder::new()
                .daily(1, 0, 0)
                .with_time_zone("Mars/Olympus")
                .build(),
        )
        .await
        .unwrap_err();
    assert!(err.is_configuration_error());

    let err = f
        .service
        .create_strategy(StrategySpecBuilder::new().with_name("   ").build())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        scheduler_errors::SchedulerError::ValidationError(_)
    ));

    // 以上失败都不应落库
    assert_eq!(f.strategy_repo.count(), 0);
}

#[tokio::test]
async fn test_update_strategy_resyncs_referencing_jobs() {
    let f = fixture();
    let strategy = f
        .service
        .create_strategy(StrategySpecBuilder::new().fixed_rate(30).build())
        .await
        .unwrap();
    let job = f
        .registry
        .create_job(JobSpecBuilder::new(strategy.id).build())
        .await
        .unwrap();
    f.engine.clear_calls();

    let updated = f
        .service
        .update_strategy(strategy.id, StrategySpecBuilder::new().daily(6, 0, 0).build())
        .await
        .unwrap();
    assert_eq!(updated.schedule_type, ScheduleType::Daily);
    assert_eq!(updated.cron_expression, "0 0 6 * * *");

    let calls = f.engine.calls();
    assert!(calls.contains(&format!("add_job:job:{}", job.id)));
    assert!(calls.contains(&format!("reschedule:trigger:{}", job.id)));

    let trigger = f.engine.trigger_for_job(job.id).unwrap();
    match trigger.schedule {
        TriggerSchedule::Cron { expression, .. } => assert_eq!(expression, "0 0 6 * * *"),
        other => panic!("unexpected schedule {other:?}"),
    }
}

#[tokio::test]
async fn test_update_missing_strategy_is_reference_error() {
    let f = fixture();
    let err = f
        .service
        .update_strategy(99, StrategySpecBuilder::new().build())
        .await
        .unwrap_err();
    assert!(err.is_reference_error());
}

#[tokio::test]
async fn test_delete_strategy_refuses_when_referenced() {
    let f = fixture();
    let strategy = f
        .service
        .create_strategy(StrategySpecBuilder::new().build())
        .await
        .unwrap();
    let job = f
        .registry
        .create_job(JobSpecBuilder::new(strategy.id).build())
        .await
        .unwrap();

    let err = f.service.delete_strategy(strategy.id).await.unwrap_err();
    assert!(err.is_state_error());
    assert_eq!(f.strategy_repo.count(), 1);

    f.registry.delete_job(job.id).await.unwrap();
    f.service
        .sync_excluded_dates(strategy.id, vec![ExcludedDateSpec::new(date(2024, 12, 25), None)])
        .await
        .unwrap();

    f.service.delete_strategy(strategy.id).await.unwrap();
    assert_eq!(f.strategy_repo.count(), 0);
    assert_eq!(f.excluded_repo.count(), 0);

    let err = f.service.delete_strategy(strategy.id).await.unwrap_err();
    assert!(err.is_reference_error());
}

#[tokio::test]
async fn test_sync_excluded_dates_dedupes_and_replaces() {
    let f = fixture();
    let strategy = f
        .service
        .create_strategy(StrategySpecBuilder::new().build())
        .await
        .unwrap();

    let dates = f
        .service
        .sync_excluded_dates(
            strategy.id,
            vec![
                ExcludedDateSpec::new(date(2024, 10, 1), Some("国庆")),
                ExcludedDateSpec::new(date(2024, 1, 1), Some("元旦")),
                ExcludedDateSpec::new(date(2024, 10, 1), Some("重复")),
            ],
        )
        .await
        .unwrap();

    assert_eq!(dates.len(), 2);
    assert_eq!(dates[0].excluded_date, date(2024, 1, 1));
    assert_eq!(dates[1].excluded_date, date(2024, 10, 1));
    assert_eq!(dates[1].reason.as_deref(), Some("国庆"));

    // 再次同步是整体替换
    let dates = f
        .service
        .sync_excluded_dates(strategy.id, vec![ExcludedDateSpec::new(date(2025, 5, 1), None)])
        .await
        .unwrap();
    assert_eq!(dates.len(), 1);

    // 相同集合重复同步结果不变
    let again = f
        .service
        .sync_excluded_dates(strategy.id, vec![ExcludedDateSpec::new(date(2025, 5, 1), None)])
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].excluded_date, dates[0].excluded_date);
    assert_eq!(f.excluded_repo.count(), 1);

    assert!(!f
        .excluded_repo
        .is_excluded(strategy.id, date(2024, 1, 1))
        .await
        .unwrap());

    // 空集合表示清空
    let dates = f.service.sync_excluded_dates(strategy.id, vec![]).await.unwrap();
    assert!(dates.is_empty());
    assert!(f
        .service
        .list_excluded_dates(strategy.id)
        .await
        .unwrap()
        .is_empty());

    let err = f.service.sync_excluded_dates(404, vec![]).await.unwrap_err();
    assert!(err.is_reference_error());
}

#[tokio::test]
async fn test_preview_skips_excluded_dates() {
    let f = fixture();
    let strategy = f
        .service
        .create_strategy(
            StrategySpecBuilder::new()
                .daily(8, 30, 0)
                .with_time_zone("UTC")
                .build(),
        )
        .await
        .unwrap();
    f.service
        .sync_excluded_dates(strategy.id, vec![ExcludedDateSpec::new(date(2024, 1, 2), None)])
        .await
        .unwrap();

    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let times = f
        .service
        .preview_fire_times(strategy.id, from, 3)
        .await
        .unwrap();

    assert_eq!(
        times,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 8, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 4, 8, 30, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_preview_uses_strategy_time_zone() {
    let f = fixture();
    let strategy = f
        .service
        .create_strategy(
            StrategySpecBuilder::new()
                .daily(9, 0, 0)
                .with_time_zone("Asia/Shanghai")
                .build(),
        )
        .await
        .unwrap();

    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let times = f
        .service
        .preview_fire_times(strategy.id, from, 1)
        .await
        .unwrap();
    assert_eq!(times, vec![Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()]);
}

#[tokio::test]
async fn test_list_strategies_filters_by_type() {
    let f = fixture();
    f.service
        .create_strategy(StrategySpecBuilder::new().with_name("hourly").build())
        .await
        .unwrap();
    f.service
        .create_strategy(
            StrategySpecBuilder::new()
                .with_name("morning")
                .daily(7, 0, 0)
                .build(),
        )
        .await
        .unwrap();

    let daily = f
        .service
        .list_strategies(&StrategyFilter {
            schedule_type: Some(ScheduleType::Daily),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].name, "morning");

    let all = f
        .service
        .list_strategies(&StrategyFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}
