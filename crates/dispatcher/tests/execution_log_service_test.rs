use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use scheduler_domain::{
    ExecutionLogFilter, ExecutionLogRepository, ExecutionStatus, JobRepository, SchedulerJob,
};
use scheduler_dispatcher::ExecutionLogService;
use scheduler_errors::SchedulerError;
use scheduler_testing_utils::{
    ExecutionLogBuilder, JobSpecBuilder, MockExecutionLogRepository, MockJobRepository,
};

async fn setup() -> (ExecutionLogService, Arc<MockExecutionLogRepository>, SchedulerJob) {
    let log_repo = Arc::new(MockExecutionLogRepository::new());
    let job_repo = Arc::new(MockJobRepository::new());
    let job = job_repo
        .create(&SchedulerJob::from_spec(JobSpecBuilder::new(1).build()))
        .await
        .unwrap();

    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let entries = [
        ExecutionLogBuilder::new(job.id)
            .scheduled_at(base)
            .with_duration_ms(10)
            .build(),
        ExecutionLogBuilder::new(job.id)
            .scheduled_at(base + Duration::hours(1))
            .failed("boom")
            .with_status(ExecutionStatus::Retried)
            .with_duration_ms(30)
            .build(),
        ExecutionLogBuilder::new(job.id)
            .scheduled_at(base + Duration::hours(2))
            .with_retry_count(1)
            .with_duration_ms(20)
            .build(),
        ExecutionLogBuilder::new(job.id)
            .scheduled_at(base + Duration::hours(3))
            .with_status(ExecutionStatus::Skipped)
            .build(),
    ];
    for log in &entries {
        log_repo.append(log).await.unwrap();
    }

    (
        ExecutionLogService::new(log_repo.clone(), job_repo),
        log_repo,
        job,
    )
}

#[tokio::test]
async fn test_list_logs_newest_first_with_filters() {
    let (service, _, job) = setup().await;

    let all = service
        .list_logs(&ExecutionLogFilter {
            job_id: Some(job.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert!(all
        .windows(2)
        .all(|w| w[0].scheduled_fire_time >= w[1].scheduled_fire_time));

    let retried = service
        .list_logs(&ExecutionLogFilter {
            status: Some(ExecutionStatus::Retried),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].error_message.as_deref(), Some("boom"));

    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let window = service
        .list_logs(&ExecutionLogFilter {
            from: Some(base + Duration::hours(1)),
            to: Some(base + Duration::hours(2)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(window.len(), 2);

    let page = service
        .list_logs(&ExecutionLogFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].scheduled_fire_time, base + Duration::hours(2));
}

#[tokio::test]
async fn test_list_logs_rejects_bad_requests() {
    let (service, _, _) = setup().await;

    let err = service
        .list_logs(&ExecutionLogFilter {
            job_id: Some(999),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_reference_error());

    let now = Utc::now();
    let err = service
        .list_logs(&ExecutionLogFilter {
            from: Some(now),
            to: Some(now - Duration::days(1)),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ValidationError(_)));
}

#[tokio::test]
async fn test_job_stats() {
    let (service, _, job) = setup().await;

    let stats = service.job_stats(job.id, None).await.unwrap();
    assert_eq!(stats.total_runs, 4);
    assert_eq!(stats.successful_runs, 2);
    assert_eq!(stats.retried_runs, 1);
    assert_eq!(stats.skipped_runs, 1);
    assert!((stats.success_rate() - 66.666).abs() < 0.01);

    let since = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();
    let recent = service.job_stats(job.id, Some(since)).await.unwrap();
    assert_eq!(recent.total_runs, 2);
    assert_eq!(recent.last_fire_time, Some(since + Duration::hours(1)));

    assert!(service
        .job_stats(999, None)
        .await
        .unwrap_err()
        .is_reference_error());
}

#[tokio::test]
async fn test_purge_logs_before_cutoff() {
    let (service, log_repo, _) = setup().await;

    let cutoff = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();
    let purged = service.purge_logs_before(cutoff).await.unwrap();
    assert_eq!(purged, 2);
    assert_eq!(log_repo.logs().len(), 2);

    assert_eq!(service.purge_logs_before(cutoff).await.unwrap(), 0);
}
