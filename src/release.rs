use crate::dashboard::notifications::{NotificationDraft, NotificationKind};
use crate::error::{BuildcastError, Result};
use crate::status::OutputLine;
use crate::supervisor::{BuildInvocation, BuildSupervisor, ProcessEvent, ProcessRunner, StreamKind};
use std::path::PathBuf;
use std::sync::Arc;

const OUTPUT_PREFIX: &str = "[GitHub Release]";

/// Runs the release script for the last successful build.
///
/// The script receives the version in `GALACTIC_VERSION`; the build counter
/// is bumped once it exits successfully.
pub struct ReleaseService {
    supervisor: Arc<BuildSupervisor>,
    runner: Arc<dyn ProcessRunner>,
    script: Option<String>,
    project_dir: PathBuf,
}

impl ReleaseService {
    pub fn new(
        supervisor: Arc<BuildSupervisor>,
        runner: Arc<dyn ProcessRunner>,
        script: Option<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            supervisor,
            runner,
            script,
            project_dir: project_dir.into(),
        })
    }

    /// Start a release in the background and return the version being released
    pub fn create_release(self: &Arc<Self>) -> Result<String> {
        let script = self
            .script
            .clone()
            .ok_or(BuildcastError::ReleaseNotConfigured)?;
        let ticket = self.supervisor.begin_release()?;

        let invocation = BuildInvocation {
            command_line: script,
            working_dir: Some(self.project_dir.clone()),
            env: vec![("GALACTIC_VERSION".to_string(), ticket.version.clone())],
        };
        let process = match self.runner.spawn(&invocation) {
            Ok(process) => process,
            Err(err) => {
                self.supervisor
                    .record_release_output(OutputLine::error(format!("{} {}", OUTPUT_PREFIX, err)));
                self.supervisor.end_release(false);
                return Err(err);
            }
        };

        crate::log_release_operation!(ticket.version, "started");
        self.supervisor.record_release_output(OutputLine::info(format!(
            "{} Creating release {}",
            OUTPUT_PREFIX, ticket.version
        )));

        let service = Arc::clone(self);
        let version = ticket.version.clone();
        tokio::spawn(async move {
            let mut events = process.events;
            let mut exit_code = -1;
            while let Some(event) = events.recv().await {
                match event {
                    ProcessEvent::Line { stream, text } => {
                        let message = format!("{} {}", OUTPUT_PREFIX, text);
                        let line = match stream {
                            StreamKind::Stdout => OutputLine::info(message),
                            StreamKind::Stderr => OutputLine::error(message),
                        };
                        service.supervisor.record_release_output(line);
                    }
                    ProcessEvent::Exited { code } => {
                        exit_code = code;
                        break;
                    }
                }
            }
            service.finish(&version, exit_code);
        });

        Ok(ticket.version)
    }

    fn finish(&self, version: &str, exit_code: i32) {
        let published = exit_code == 0;
        if published {
            if let Err(e) = self.supervisor.counter().increment() {
                tracing::error!(error = %e, "Failed to increment build counter");
            }
            self.supervisor.record_release_output(OutputLine::success(format!(
                "{} Release {} published",
                OUTPUT_PREFIX, version
            )));
            self.supervisor.notifications().push(
                NotificationDraft::new(
                    NotificationKind::Success,
                    "Release Created",
                    format!("Version {} released", version),
                )
                .auto_hide_after(10_000),
            );
        } else {
            self.supervisor.record_release_output(OutputLine::error(format!(
                "{} Release failed with exit code {}",
                OUTPUT_PREFIX, exit_code
            )));
            self.supervisor.notifications().push(
                NotificationDraft::new(
                    NotificationKind::Error,
                    "Release Failed",
                    format!("Release of {} failed with exit code {}", version, exit_code),
                )
                .sticky(),
            );
        }
        crate::log_release_operation!(version, if published { "published" } else { "failed" });
        self.supervisor.end_release(published);
    }
}
