use super::{BuildRecord, HistoryStore, RecordMetrics};
use crate::error::{BuildcastError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// History kept as a bounded JSON array, newest first
pub struct JsonHistoryStore {
    path: PathBuf,
    limit: usize,
    write_lock: Mutex<()>,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<BuildRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| BuildcastError::History {
            operation: "load".to_string(),
            reason: format!("{}: {}", self.path.display(), e),
        })
    }

    fn write_all(&self, records: &[BuildRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl HistoryStore for JsonHistoryStore {
    fn save_build_record(
        &self,
        version: &str,
        build_number: u64,
        metrics: RecordMetrics,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut records = self.read_all()?;
        records.insert(
            0,
            BuildRecord {
                version: version.to_string(),
                date: Utc::now(),
                build_number,
                build_metrics: metrics,
            },
        );
        records.truncate(self.limit);
        self.write_all(&records)
    }

    fn load_recent_history(&self) -> Result<Vec<BuildRecord>> {
        let mut records = self.read_all()?;
        records.truncate(self.limit);
        Ok(records)
    }
}
