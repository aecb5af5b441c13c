//! Metrics collector for the job scheduler
//!
//! Records firing counts and durations through the `metrics` facade; the
//! Prometheus exporter is installed once at startup by [`init_metrics`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Metrics collector for job firings
#[derive(Clone)]
pub struct MetricsCollector {
    job_duration: Histogram,
    retries_scheduled_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            job_duration: histogram!("scheduler_job_duration_ms"),
            retries_scheduled_total: counter!("scheduler_job_retries_scheduled_total"),
        }
    }

    /// Record the terminal status of one firing
    pub fn record_firing(&self, job_type: &str, status: &'static str, duration_ms: f64) {
        counter!(
            "scheduler_job_firings_total",
            "status" => status,
            "job_type" => job_type.to_string()
        )
        .increment(1);
        self.job_duration.record(duration_ms);
    }

    pub fn record_retry_scheduled(&self, job_type: &str, retry_count: u32) {
        self.retries_scheduled_total.increment(1);
        tracing::debug!(
            job_type = job_type,
            retry_count = retry_count,
            "Job retry scheduled"
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装 Prometheus 导出器并在指定地址提供 `/metrics`
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}
