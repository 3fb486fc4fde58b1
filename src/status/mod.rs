//! Build status data model and the components that mutate it.
//!
//! [`classifier`] turns raw tool output into [`classifier::ClassifiedLine`]s,
//! [`aggregate::BuildAggregate`] folds them into the current [`BuildStatus`],
//! and [`progress`] estimates completion while Gradle reports nothing better.

use crate::ring::BoundedQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod aggregate;
pub mod classifier;
pub mod progress;

pub use aggregate::BuildAggregate;
pub use classifier::{classify, ClassifiedLine, LineEvent, TaskOutcome};

/// Coarse lifecycle state of one build attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    Idle,
    Starting,
    Building,
    Success,
    Failed,
    Stopped,
}

impl BuildPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Building => "building",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Pending,
    Building,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub status: ModuleState,
    pub current_task: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl ModuleStatus {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: ModuleState::Pending,
            current_task: None,
            last_update: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub module: String,
    pub task: String,
    pub status: TaskState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Gradle outcome keyword, e.g. `UP-TO-DATE`
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub message: String,
}

impl OutputLine {
    pub fn new(kind: OutputKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(OutputKind::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutputKind::Success, message)
    }
}

/// Where the current progress value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSource {
    Estimated,
    Reported,
}

/// Identity of one build attempt, fixed at `reset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMeta {
    pub build_id: String,
    pub command: String,
    pub version: String,
    pub build_number: u64,
}

/// The single current status record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub build_id: Option<String>,
    pub phase: BuildPhase,
    pub progress_percent: u8,
    pub progress_source: ProgressSource,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub command: Option<String>,
    pub version: Option<String>,
    pub build_number: Option<u64>,
    pub modules: BTreeMap<String, ModuleStatus>,
    pub tasks: BTreeMap<String, TaskRecord>,
    pub release_ready: bool,
    pub release_in_progress: bool,
    pub error: Option<String>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "BoundedQueue::is_empty")]
    pub output_log: BoundedQueue<OutputLine>,
    pub truncated_lines: u64,
}

impl BuildStatus {
    /// Status shown before the first build of this process
    pub fn idle<S: AsRef<str>>(modules: &[S], log_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            build_id: None,
            phase: BuildPhase::Idle,
            progress_percent: 0,
            progress_source: ProgressSource::Estimated,
            start_time: None,
            end_time: None,
            exit_code: None,
            command: None,
            version: None,
            build_number: None,
            modules: pending_modules(modules, now),
            tasks: BTreeMap::new(),
            release_ready: false,
            release_in_progress: false,
            error: None,
            last_update: now,
            output_log: BoundedQueue::new(log_capacity),
            truncated_lines: 0,
        }
    }

    /// Copy of everything except the output log
    pub fn without_output(&self) -> Self {
        Self {
            build_id: self.build_id.clone(),
            phase: self.phase,
            progress_percent: self.progress_percent,
            progress_source: self.progress_source,
            start_time: self.start_time,
            end_time: self.end_time,
            exit_code: self.exit_code,
            command: self.command.clone(),
            version: self.version.clone(),
            build_number: self.build_number,
            modules: self.modules.clone(),
            tasks: self.tasks.clone(),
            release_ready: self.release_ready,
            release_in_progress: self.release_in_progress,
            error: self.error.clone(),
            last_update: self.last_update,
            output_log: BoundedQueue::new(0),
            truncated_lines: self.truncated_lines,
        }
    }

    /// Wall-clock duration of the build, if it has both ends
    pub fn duration_ms(&self) -> Option<u64> {
        let start = self.start_time?;
        let end = self.end_time?;
        Some((end - start).num_milliseconds().max(0) as u64)
    }
}

pub(crate) fn pending_modules<S: AsRef<str>>(
    modules: &[S],
    now: DateTime<Utc>,
) -> BTreeMap<String, ModuleStatus> {
    modules
        .iter()
        .map(|m| (m.as_ref().to_string(), ModuleStatus::pending(now)))
        .collect()
}
