// Centralized constants for buildcast to avoid magic numbers

/// Default HTTP/WebSocket port
pub const DEFAULT_PORT: u16 = 5001;

/// Gradle task list used when a client sends an empty command
pub const DEFAULT_BUILD_COMMAND: &str = "clean build";

/// Modules tracked on the dashboard when none are configured
pub const DEFAULT_MODULES: &[&str] = &[
    "core",
    "power",
    "machinery",
    "biotech",
    "energy",
    "construction",
    "space",
    "utilities",
    "vehicles",
    "weaponry",
    "robotics",
];

/// Maximum number of output lines retained per build
pub const DEFAULT_OUTPUT_LOG_CAPACITY: usize = 5000;

/// Maximum number of notifications kept in the queue
pub const NOTIFICATION_CAPACITY: usize = 10;

/// Auto-hide delay for ordinary notifications in milliseconds
pub const DEFAULT_NOTIFICATION_TIMEOUT_MS: u64 = 5000;

/// Per-observer outbound queue depth before the observer is considered dead
pub const OBSERVER_QUEUE_CAPACITY: usize = 1024;

/// Interval between progress estimator ticks in milliseconds
pub const PROGRESS_TICK_MS: u64 = 2000;

/// Progress estimator curve scale
pub const PROGRESS_CURVE_SCALE: f64 = 30.0;

/// Progress estimator time unit in milliseconds
pub const PROGRESS_CURVE_UNIT_MS: f64 = 2000.0;

/// Highest percentage the estimator may report
pub const PROGRESS_ESTIMATE_CEILING: u8 = 99;

/// Number of past builds kept by the history store
pub const HISTORY_LIMIT: usize = 50;

/// Number of recent builds used for dashboard metrics
pub const METRICS_WINDOW: usize = 10;

/// Base of every version string, followed by `.b<build>-<date>`
pub const VERSION_BASE: &str = "0.1.0";

/// File holding the build counter
pub const BUILD_COUNTER_FILE: &str = ".build_counter";
