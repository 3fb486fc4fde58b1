use crate::constants::{
    BUILD_COUNTER_FILE, DEFAULT_MODULES, DEFAULT_OUTPUT_LOG_CAPACITY, DEFAULT_PORT, HISTORY_LIMIT,
};
use crate::error::Result;
use crate::history::{HistoryStore, JsonHistoryStore, SqliteHistoryStore};
use crate::supervisor::{CommandResolver, SupervisorConfig};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryBackend {
    Json,
    Sqlite,
}

/// Build dashboard server streaming Gradle progress to WebSocket clients
#[derive(Debug, Clone, Parser)]
#[command(name = "buildcast", version, about)]
pub struct Config {
    /// Port for HTTP and WebSocket traffic
    #[arg(long, env = "BUILDCAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, env = "BUILDCAST_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Gradle project root the build runs in
    #[arg(long, env = "BUILDCAST_PROJECT_DIR", default_value = "..")]
    pub project_dir: PathBuf,

    /// Directory of static dashboard files
    #[arg(long, env = "BUILDCAST_PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    #[arg(long, env = "BUILDCAST_GRADLE_WRAPPER", default_value = "./gradlew")]
    pub gradle_wrapper: String,

    /// Script run instead of Gradle for `build` and `clean build`
    #[arg(long, env = "BUILDCAST_BUILD_ALL_SCRIPT")]
    pub build_all_script: Option<String>,

    /// JAVA_HOME exported to Gradle
    #[arg(long, env = "BUILDCAST_JAVA_HOME")]
    pub java_home: Option<String>,

    /// Comma-separated module names shown on the dashboard
    #[arg(long, env = "BUILDCAST_MODULES", value_delimiter = ',')]
    pub modules: Vec<String>,

    #[arg(long, env = "BUILDCAST_HISTORY_BACKEND", value_enum, default_value_t = HistoryBackend::Json)]
    pub history_backend: HistoryBackend,

    /// Defaults to `version_history.json` (or `build_history.db`) in the project dir
    #[arg(long, env = "BUILDCAST_HISTORY_PATH")]
    pub history_path: Option<PathBuf>,

    #[arg(long, env = "BUILDCAST_COUNTER_PATH")]
    pub counter_path: Option<PathBuf>,

    /// Release script; releases are disabled without one
    #[arg(long, env = "BUILDCAST_RELEASE_SCRIPT")]
    pub release_script: Option<String>,

    #[arg(long, env = "BUILDCAST_OUTPUT_LOG_CAPACITY", default_value_t = DEFAULT_OUTPUT_LOG_CAPACITY)]
    pub output_log_capacity: usize,

    /// Stop builds running longer than this many seconds
    #[arg(long, env = "BUILDCAST_MAX_BUILD_SECS")]
    pub max_build_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "BUILDCAST_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn module_names(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .modules
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if configured.is_empty() {
            DEFAULT_MODULES.iter().map(|m| m.to_string()).collect()
        } else {
            configured
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_path.clone().unwrap_or_else(|| {
            let file = match self.history_backend {
                HistoryBackend::Json => "version_history.json",
                HistoryBackend::Sqlite => "build_history.db",
            };
            self.project_dir.join(file)
        })
    }

    pub fn counter_path(&self) -> PathBuf {
        self.counter_path
            .clone()
            .unwrap_or_else(|| self.project_dir.join(BUILD_COUNTER_FILE))
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            modules: self.module_names(),
            output_log_capacity: self.output_log_capacity,
            max_build_duration: self.max_build_secs.map(Duration::from_secs),
            counter_path: self.counter_path(),
        }
    }

    pub fn command_resolver(&self) -> CommandResolver {
        CommandResolver {
            project_dir: self.project_dir.clone(),
            gradle_wrapper: self.gradle_wrapper.clone(),
            build_all_script: self.build_all_script.clone(),
            java_home: self.java_home.clone(),
        }
    }

    pub fn open_history(&self) -> Result<Arc<dyn HistoryStore>> {
        let path = self.history_path();
        Ok(match self.history_backend {
            HistoryBackend::Json => Arc::new(JsonHistoryStore::new(path, HISTORY_LIMIT)),
            HistoryBackend::Sqlite => Arc::new(SqliteHistoryStore::new(&path, HISTORY_LIMIT)?),
        })
    }
}
