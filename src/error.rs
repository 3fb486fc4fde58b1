/// buildcast error types
use thiserror::Error;

/// Main error type for buildcast operations
#[derive(Debug, Error)]
pub enum BuildcastError {
    /// A build is already running; `start` never queues
    #[error("A build is already running (build {build_id})")]
    AlreadyRunning { build_id: String },

    /// The client command contained something other than Gradle task tokens
    #[error("Invalid build command {command:?}: {reason}")]
    InvalidCommand { command: String, reason: String },

    /// The build subprocess could not be started
    #[error("Failed to spawn build process `{command}`: {reason}")]
    SpawnFailure { command: String, reason: String },

    /// Release requested before a successful build
    #[error("Cannot create release: build must be successful first")]
    ReleaseNotReady,

    /// Release requested while another release is still running
    #[error("A release is already in progress")]
    ReleaseInProgress,

    /// No release script configured
    #[error("No release script configured")]
    ReleaseNotConfigured,

    /// History store failure
    #[error("History error in {operation}: {reason}")]
    History { operation: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, BuildcastError>;

impl BuildcastError {
    /// Whether the error was caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. }
                | Self::InvalidCommand { .. }
                | Self::ReleaseNotReady
                | Self::ReleaseInProgress
                | Self::ReleaseNotConfigured
        )
    }
}
