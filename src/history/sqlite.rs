use super::{BuildRecord, BuildResult, HistoryStore, RecordMetrics};
use crate::error::{BuildcastError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// History kept in a SQLite table, pruned to the newest `limit` rows
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
    limit: usize,
}

impl SqliteHistoryStore {
    pub fn new(db_path: &Path, limit: usize) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, limit)
    }

    pub fn in_memory(limit: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, limit)
    }

    fn with_connection(conn: Connection, limit: usize) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS build_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version TEXT NOT NULL,
                date TEXT NOT NULL,
                build_number INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                result TEXT NOT NULL,
                module_statuses TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            limit,
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn save_build_record(
        &self,
        version: &str,
        build_number: u64,
        metrics: RecordMetrics,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let modules = serde_json::to_string(&metrics.module_statuses)?;
        conn.execute(
            "INSERT INTO build_history (version, date, build_number, duration_ms, result, module_statuses)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                version,
                now,
                build_number as i64,
                metrics.duration as i64,
                metrics.result.as_str(),
                modules
            ],
        )?;
        conn.execute(
            "DELETE FROM build_history WHERE id NOT IN
                (SELECT id FROM build_history ORDER BY id DESC LIMIT ?1)",
            params![self.limit as i64],
        )?;
        Ok(())
    }

    fn load_recent_history(&self) -> Result<Vec<BuildRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT version, date, build_number, duration_ms, result, module_statuses
             FROM build_history
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![self.limit as i64], |row| {
            let version: String = row.get(0)?;
            let date: String = row.get(1)?;
            let build_number: i64 = row.get(2)?;
            let duration: i64 = row.get(3)?;
            let result: String = row.get(4)?;
            let modules: String = row.get(5)?;
            Ok((version, date, build_number, duration, result, modules))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (version, date, build_number, duration, result, modules) = row?;
            let date = DateTime::parse_from_rfc3339(&date)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| corrupt_row(&version, "date", e))?;
            let module_statuses = serde_json::from_str(&modules)
                .map_err(|e| corrupt_row(&version, "module_statuses", e))?;
            records.push(BuildRecord {
                version,
                date,
                build_number: build_number.max(0) as u64,
                build_metrics: RecordMetrics {
                    duration: duration.max(0) as u64,
                    result: BuildResult::parse(&result),
                    module_statuses,
                },
            });
        }
        Ok(records)
    }
}

fn corrupt_row(version: &str, column: &str, err: impl std::fmt::Display) -> BuildcastError {
    BuildcastError::History {
        operation: "load".to_string(),
        reason: format!("corrupt {} for {}: {}", column, version, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ModuleState;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sqlite_history_store() {
        let db_file = NamedTempFile::new().unwrap();
        let store = SqliteHistoryStore::new(db_file.path(), 2).unwrap();

        let mut modules = BTreeMap::new();
        modules.insert("core".to_string(), ModuleState::Success);

        for i in 1..=3u64 {
            store
                .save_build_record(
                    &format!("0.1.0.b{}-20260101", i),
                    i,
                    RecordMetrics {
                        duration: 1000 * i,
                        result: BuildResult::Success,
                        module_statuses: modules.clone(),
                    },
                )
                .unwrap();
        }

        let history = store.load_recent_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].build_number, 3);
        assert_eq!(history[1].build_number, 2);
        assert_eq!(history[0].build_metrics.duration, 3000);
        assert_eq!(
            history[0].build_metrics.module_statuses["core"],
            ModuleState::Success
        );
    }

    #[test]
    fn test_in_memory_starts_empty() {
        let store = SqliteHistoryStore::in_memory(10).unwrap();
        assert!(store.load_recent_history().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_row_reports_history_error() {
        let store = SqliteHistoryStore::in_memory(10).unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO build_history (version, date, build_number, duration_ms, result, module_statuses)
                 VALUES ('0.1.0.b1-20260101', 'yesterday', 1, 10, 'success', '{}')",
                [],
            )
            .unwrap();
        let err = store.load_recent_history().unwrap_err();
        assert!(matches!(err, BuildcastError::History { .. }));
        assert!(err.to_string().contains("date"));

        store.conn.lock().execute("DELETE FROM build_history", []).unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO build_history (version, date, build_number, duration_ms, result, module_statuses)
                 VALUES ('0.1.0.b2-20260101', '2026-01-01T00:00:00Z', 2, 10, 'success', 'not json')",
                [],
            )
            .unwrap();
        let err = store.load_recent_history().unwrap_err();
        assert!(err.to_string().contains("module_statuses"));
    }
}
