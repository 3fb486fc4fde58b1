use std::io;
/// Structured logging for buildcast
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("buildcast=info"));

    let registry = Registry::default().with(env_filter);

    if json_output {
        // JSON output for log aggregation
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::ACTIVE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Human-readable duration used in notifications, e.g. `2 min 5 sec`
pub fn format_duration(duration_ms: u64) -> String {
    let secs = (duration_ms + 500) / 1000;
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{} min {} sec", minutes, seconds)
    } else {
        format!("{} seconds", seconds)
    }
}

#[macro_export]
macro_rules! log_build_start {
    ($build_id:expr, $command:expr) => {
        tracing::info!(build_id = %$build_id, command = %$command, "Build started");
    };
}

#[macro_export]
macro_rules! log_build_complete {
    ($build_id:expr, $phase:expr, $duration_ms:expr) => {
        tracing::info!(
            build_id = %$build_id,
            phase = $phase.as_str(),
            duration_ms = $duration_ms,
            "Build completed"
        );
    };
}

#[macro_export]
macro_rules! log_observer_dropped {
    ($id:expr, $reason:expr) => {
        tracing::debug!(observer = $id, reason = ?$reason, "Dropping observer");
    };
}

#[macro_export]
macro_rules! log_release_operation {
    ($version:expr, $status:expr) => {
        tracing::info!(version = %$version, status = $status, "Release operation");
    };
}
