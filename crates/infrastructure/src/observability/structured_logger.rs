//! Structured logging utilities
//!
//! Emits one event per significant step of a job's lifecycle with stable
//! field names, so JSON logs can be filtered by `event` and `job.id`.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a firing delivered by the trigger engine
    pub fn log_job_fired(
        job_id: i64,
        job_name: &str,
        job_type: &str,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
    ) {
        info!(
            event = "job_fired",
            job.id = job_id,
            job.name = job_name,
            job.job_type = job_type,
            job.retry_count = retry_count,
            job.scheduled_at = %scheduled_at,
            "Job fired"
        );
    }

    /// Log the terminal status of a firing
    pub fn log_job_completed(
        job_id: i64,
        job_name: &str,
        status: &str,
        duration_ms: i64,
        error_message: Option<&str>,
    ) {
        match error_message {
            None => info!(
                event = "job_completed",
                job.id = job_id,
                job.name = job_name,
                job.status = status,
                job.duration_ms = duration_ms,
                "Job firing completed"
            ),
            Some(message) => warn!(
                event = "job_completed",
                job.id = job_id,
                job.name = job_name,
                job.status = status,
                job.duration_ms = duration_ms,
                job.error = message,
                "Job firing did not succeed"
            ),
        }
    }

    /// Log a job registration change with the trigger engine
    pub fn log_job_registration(job_id: i64, trigger_key: &str, registered: bool) {
        debug!(
            event = if registered { "job_registered" } else { "job_unregistered" },
            job.id = job_id,
            trigger.key = trigger_key,
            "Trigger engine registration changed"
        );
    }
}
