//! Build history persistence and version numbering.
//!
//! The supervisor writes one [`BuildRecord`] per successful build. Two stores
//! exist: a bounded JSON array on disk and a SQLite table.

use crate::constants::VERSION_BASE;
use crate::error::Result;
use crate::status::ModuleState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod json;
pub mod sqlite;

pub use json::JsonHistoryStore;
pub use sqlite::SqliteHistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Success,
    Failed,
}

impl BuildResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "success" {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetrics {
    /// Build duration in milliseconds
    pub duration: u64,
    pub result: BuildResult,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub module_statuses: BTreeMap<String, ModuleState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub version: String,
    pub date: DateTime<Utc>,
    pub build_number: u64,
    pub build_metrics: RecordMetrics,
}

/// Append-only, most-recent-first store of finished builds
pub trait HistoryStore: Send + Sync {
    fn save_build_record(
        &self,
        version: &str,
        build_number: u64,
        metrics: RecordMetrics,
    ) -> Result<()>;

    fn load_recent_history(&self) -> Result<Vec<BuildRecord>>;
}

/// `0.1.0.b<build>-<YYYYMMDD>`
pub fn version_string(build_number: u64, date: DateTime<Utc>) -> String {
    format!(
        "{}.b{}-{}",
        VERSION_BASE,
        build_number,
        date.format("%Y%m%d")
    )
}

/// Plain-text build counter file, bumped after each successful release
pub struct BuildCounter {
    path: PathBuf,
}

impl BuildCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current build number; a missing or unreadable file counts as 1
    pub fn current(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    pub fn increment(&self) -> Result<u64> {
        let next = self.current() + 1;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, next.to_string())?;
        tracing::info!(build_number = next, "Build counter incremented");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_version_string_format() {
        let date = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(version_string(12, date), "0.1.0.b12-20260307");
    }

    #[test]
    fn test_counter_defaults_to_one() {
        let dir = tempdir().unwrap();
        let counter = BuildCounter::new(dir.path().join(".build_counter"));
        assert_eq!(counter.current(), 1);

        fs::write(counter.path(), "garbage").unwrap();
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_counter_increment_persists() {
        let dir = tempdir().unwrap();
        let counter = BuildCounter::new(dir.path().join(".build_counter"));
        fs::write(counter.path(), "7\n").unwrap();
        assert_eq!(counter.increment().unwrap(), 8);
        assert_eq!(counter.current(), 8);
    }

    #[test]
    fn test_record_wire_format() {
        let record = BuildRecord {
            version: "0.1.0.b3-20260101".to_string(),
            date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            build_number: 3,
            build_metrics: RecordMetrics {
                duration: 1500,
                result: BuildResult::Success,
                module_statuses: BTreeMap::new(),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["buildNumber"], 3);
        assert_eq!(json["buildMetrics"]["duration"], 1500);
        assert_eq!(json["buildMetrics"]["result"], "success");
    }
}
