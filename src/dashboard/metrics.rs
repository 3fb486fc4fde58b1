use crate::constants::METRICS_WINDOW;
use crate::history::{BuildRecord, BuildResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate figures over the most recent builds in history
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetrics {
    pub total_builds: u64,
    pub successful_builds: u64,
    pub failed_builds: u64,
    pub total_duration_ms: u64,
    pub average_build_time_ms: f64,
    pub success_rate: f64,
    pub last_successful_build: Option<DateTime<Utc>>,
    pub last_version: Option<String>,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the newest [`METRICS_WINDOW`] records; `records` is newest first
    pub fn from_history(records: &[BuildRecord]) -> Self {
        let mut metrics = Self::new();
        for record in records.iter().take(METRICS_WINDOW) {
            metrics.total_builds += 1;
            metrics.total_duration_ms += record.build_metrics.duration;
            match record.build_metrics.result {
                BuildResult::Success => {
                    metrics.successful_builds += 1;
                    if metrics.last_successful_build.is_none() {
                        metrics.last_successful_build = Some(record.date);
                    }
                }
                BuildResult::Failed => metrics.failed_builds += 1,
            }
        }
        metrics.last_version = records.first().map(|r| r.version.clone());
        metrics.average_build_time_ms = metrics.average_build_time();
        metrics.success_rate = metrics.compute_success_rate();
        metrics
    }

    fn average_build_time(&self) -> f64 {
        if self.total_builds == 0 {
            0.0
        } else {
            (self.total_duration_ms as f64) / (self.total_builds as f64)
        }
    }

    fn compute_success_rate(&self) -> f64 {
        let total = self.successful_builds + self.failed_builds;
        if total == 0 {
            0.0
        } else {
            (self.successful_builds as f64) / (total as f64)
        }
    }
}
