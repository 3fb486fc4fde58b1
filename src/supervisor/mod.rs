//! Lifecycle of the single build subprocess.
//!
//! The supervisor owns the [`BuildAggregate`] behind one mutex. Every output
//! line is classified outside the lock, then applied and broadcast while the
//! lock is held, so all observers see mutations in the same order. Lock order
//! is always aggregate, then notification queue, then hub observers.

use crate::constants::PROGRESS_TICK_MS;
use crate::dashboard::hub::{BroadcastHub, Observer, ObserverId};
use crate::dashboard::metrics::BuildMetrics;
use crate::dashboard::notifications::{NotificationCenter, NotificationDraft, NotificationKind};
use crate::dashboard::protocol::ServerMessage;
use crate::error::{BuildcastError, Result};
use crate::history::{version_string, BuildCounter, BuildRecord, BuildResult, HistoryStore, RecordMetrics};
use crate::logging::format_duration;
use crate::status::{
    classify, BuildAggregate, BuildMeta, BuildPhase, BuildStatus, LineEvent, OutputLine,
    TaskRecord,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

pub mod command;
pub mod runner;

pub use command::CommandResolver;
pub use runner::{
    BuildInvocation, ProcessControl, ProcessEvent, ProcessRunner, ShellRunner, SpawnedProcess,
    StreamKind,
};

const RELEASE_READY_MESSAGE: &str = "[GitHub] Build successful! Ready to create GitHub release.";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub modules: Vec<String>,
    pub output_log_capacity: usize,
    /// Wall-clock cap after which a build is stopped
    pub max_build_duration: Option<Duration>,
    pub counter_path: PathBuf,
}

/// Result of a stop request. `Signalled` only means the signal was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Signalled,
    SignalFailed(String),
    NotRunning,
}

/// Version and build number a release is cut from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTicket {
    pub version: String,
    pub build_number: u64,
}

struct RunningBuild {
    build_id: String,
    control: Box<dyn ProcessControl>,
}

struct SupervisorState {
    aggregate: BuildAggregate,
    running: Option<RunningBuild>,
    /// Bumped on every start; events tagged with an older value are ignored
    generation: u64,
}

pub struct BuildSupervisor {
    state: Mutex<SupervisorState>,
    hub: Arc<BroadcastHub>,
    notifications: Arc<NotificationCenter>,
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn ProcessRunner>,
    resolver: CommandResolver,
    counter: BuildCounter,
    config: SupervisorConfig,
}

impl BuildSupervisor {
    pub fn new(
        config: SupervisorConfig,
        resolver: CommandResolver,
        runner: Arc<dyn ProcessRunner>,
        history: Arc<dyn HistoryStore>,
        hub: Arc<BroadcastHub>,
        notifications: Arc<NotificationCenter>,
    ) -> Arc<Self> {
        let aggregate = BuildAggregate::new(&config.modules, config.output_log_capacity);
        Arc::new(Self {
            state: Mutex::new(SupervisorState {
                aggregate,
                running: None,
                generation: 0,
            }),
            hub,
            notifications,
            history,
            runner,
            resolver,
            counter: BuildCounter::new(config.counter_path.clone()),
            config,
        })
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn counter(&self) -> &BuildCounter {
        &self.counter
    }

    /// Start a build. Fails fast without touching the status if one is
    /// running or a release is still publishing the previous build.
    pub fn start(self: &Arc<Self>, command: Option<&str>) -> Result<String> {
        let mut state = self.state.lock();
        if let Some(running) = &state.running {
            return Err(BuildcastError::AlreadyRunning {
                build_id: running.build_id.clone(),
            });
        }
        if state.aggregate.status().release_in_progress {
            return Err(BuildcastError::ReleaseInProgress);
        }
        let normalized = CommandResolver::normalize(command)?;
        let invocation = self.resolver.resolve(&normalized);

        state.generation += 1;
        let generation = state.generation;
        let build_id = uuid::Uuid::new_v4().to_string();
        let build_number = self.counter.current();
        let version = version_string(build_number, Utc::now());

        state.aggregate.reset(
            &self.config.modules,
            BuildMeta {
                build_id: build_id.clone(),
                command: normalized.clone(),
                version: version.clone(),
                build_number,
            },
        );
        state.aggregate.append_output(OutputLine::info(format!(
            "Executing build command: {}",
            invocation.command_line
        )));
        self.hub.broadcast_status(state.aggregate.snapshot());

        match self.runner.spawn(&invocation) {
            Ok(process) => {
                state.running = Some(RunningBuild {
                    build_id: build_id.clone(),
                    control: process.control,
                });
                drop(state);

                crate::log_build_start!(build_id, normalized);
                self.notifications.push(
                    NotificationDraft::new(
                        NotificationKind::Info,
                        "Build Started",
                        format!("Building version {} ({})", version, normalized),
                    )
                    .auto_hide_after(8000),
                );

                let supervisor = Arc::clone(self);
                tokio::spawn(async move {
                    supervisor.drive(generation, process.events).await;
                });
                Ok(build_id)
            }
            Err(err) => {
                let reason = err.to_string();
                let line = state.aggregate.mark_spawn_failed(&reason);
                self.hub.broadcast_delta(vec![line]);
                self.hub.broadcast_status(state.aggregate.status_view());
                drop(state);

                tracing::error!(build_id = %build_id, error = %reason, "Failed to start build");
                self.notifications.push(
                    NotificationDraft::new(NotificationKind::Error, "Build Error", reason).sticky(),
                );
                Err(err)
            }
        }
    }

    /// Signal the build's process group and mark the build stopped at once.
    pub fn stop(&self) -> StopOutcome {
        let mut state = self.state.lock();
        let Some(running) = state.running.as_ref() else {
            return StopOutcome::NotRunning;
        };
        let build_id = running.build_id.clone();
        let outcome = match running.control.terminate() {
            Ok(()) => StopOutcome::Signalled,
            Err(reason) => StopOutcome::SignalFailed(reason),
        };
        // A process that could not be signalled still counts as running
        if outcome == StopOutcome::Signalled {
            state.running = None;
        }

        let changed = state.aggregate.mark_stopped();
        if changed {
            let line = OutputLine::error("Build stopped by user");
            state.aggregate.append_output(line.clone());
            self.hub.broadcast_delta(vec![line]);
            self.hub.broadcast_status(state.aggregate.status_view());
        }
        drop(state);

        tracing::info!(build_id = %build_id, outcome = ?outcome, "Build stop requested");
        if changed {
            self.notifications.push(NotificationDraft::new(
                NotificationKind::Warning,
                "Build Stopped",
                "Build was stopped by user",
            ));
        }
        outcome
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// Register an observer; it receives the full snapshot, then any active notifications
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = {
            let state = self.state.lock();
            self.hub.subscribe(observer, state.aggregate.snapshot())
        };
        let active = self.notifications.list();
        if !active.is_empty() {
            self.hub.send_to(id, ServerMessage::Notifications(active));
        }
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.hub.unsubscribe(id);
    }

    pub fn snapshot(&self) -> BuildStatus {
        self.state.lock().aggregate.snapshot()
    }

    pub fn status_view(&self) -> BuildStatus {
        self.state.lock().aggregate.status_view()
    }

    pub fn output(&self) -> Vec<OutputLine> {
        self.state.lock().aggregate.output()
    }

    pub fn tasks(&self) -> BTreeMap<String, TaskRecord> {
        self.state.lock().aggregate.status().tasks.clone()
    }

    pub fn history(&self) -> Result<Vec<BuildRecord>> {
        self.history.load_recent_history()
    }

    pub fn metrics(&self) -> Result<BuildMetrics> {
        Ok(BuildMetrics::from_history(&self.history.load_recent_history()?))
    }

    /// Claim the release gate: requires a successful build and no release in flight
    pub fn begin_release(&self) -> Result<ReleaseTicket> {
        let mut state = self.state.lock();
        let status = state.aggregate.status();
        if !status.release_ready {
            return Err(BuildcastError::ReleaseNotReady);
        }
        if status.release_in_progress {
            return Err(BuildcastError::ReleaseInProgress);
        }
        let ticket = ReleaseTicket {
            version: status.version.clone().unwrap_or_default(),
            build_number: status.build_number.unwrap_or_else(|| self.counter.current()),
        };
        state.aggregate.set_release_in_progress(true);
        self.hub.broadcast_status(state.aggregate.status_view());
        Ok(ticket)
    }

    /// Log a line produced by the release script
    pub fn record_release_output(&self, line: OutputLine) {
        let mut state = self.state.lock();
        state.aggregate.append_output(line.clone());
        self.hub.broadcast_delta(vec![line]);
    }

    /// Release the gate; a published release cannot be published again
    pub fn end_release(&self, published: bool) {
        let mut state = self.state.lock();
        state.aggregate.set_release_in_progress(false);
        if published {
            state.aggregate.set_release_ready(false);
        }
        self.hub.broadcast_status(state.aggregate.status_view());
    }

    async fn drive(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<ProcessEvent>) {
        let mut tick = tokio::time::interval(Duration::from_millis(PROGRESS_TICK_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        let deadline = self.config.max_build_duration.map(|d| Instant::now() + d);
        let timeout = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);
        let mut timed_out = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ProcessEvent::Line { stream, text }) => {
                        self.handle_line(generation, stream, &text);
                    }
                    Some(ProcessEvent::Exited { code }) => {
                        self.handle_exit(generation, code);
                        break;
                    }
                    None => {
                        tracing::warn!(generation, "Build event stream closed without exit status");
                        self.handle_exit(generation, -1);
                        break;
                    }
                },
                _ = tick.tick() => {
                    self.tick_estimate(generation);
                    self.hub.housekeeping();
                }
                _ = &mut timeout, if !timed_out => {
                    timed_out = true;
                    tracing::warn!(generation, "Build exceeded maximum duration, stopping");
                    if self.current_generation() == generation {
                        self.stop();
                    }
                }
            }
        }
    }

    fn current_generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn handle_line(&self, generation: u64, stream: StreamKind, text: &str) {
        let mut classified = classify(text);
        if stream == StreamKind::Stderr {
            classified = classified.from_stderr();
        }
        let plain = matches!(classified.event, LineEvent::Plain);

        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if state.aggregate.begin_implied_task(&classified) {
            self.hub.broadcast_status(state.aggregate.status_view());
        }
        let line = state.aggregate.apply(classified);
        self.hub.broadcast_delta(vec![line]);
        // Plain lines only touch the log, which the delta already carries
        if !plain {
            self.hub.broadcast_status(state.aggregate.status_view());
        }
    }

    fn tick_estimate(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if state.aggregate.advance_estimate(Utc::now()) {
            self.hub.broadcast_status(state.aggregate.status_view());
        }
    }

    fn handle_exit(&self, generation: u64, exit_code: i32) {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(generation, exit_code, "Ignoring exit of superseded build");
            return;
        }
        state.running = None;
        let phase = state.aggregate.finish(exit_code);

        let status = state.aggregate.status();
        let build_id = status.build_id.clone().unwrap_or_default();
        let duration_ms = status.duration_ms().unwrap_or(0);
        let mut record = None;

        if phase == BuildPhase::Success {
            record = Some((
                status.version.clone().unwrap_or_default(),
                status.build_number.unwrap_or(0),
                RecordMetrics {
                    duration: duration_ms,
                    result: BuildResult::Success,
                    module_statuses: status
                        .modules
                        .iter()
                        .map(|(name, m)| (name.clone(), m.status))
                        .collect(),
                },
            ));
            state.aggregate.set_release_ready(true);
            let line = OutputLine::info(RELEASE_READY_MESSAGE);
            state.aggregate.append_output(line.clone());
            self.hub.broadcast_delta(vec![line]);
        }
        self.hub.broadcast_status(state.aggregate.status_view());
        drop(state);

        crate::log_build_complete!(build_id, phase, duration_ms);
        let elapsed = format_duration(duration_ms);
        match phase {
            BuildPhase::Success => {
                self.notifications.push(
                    NotificationDraft::new(
                        NotificationKind::Success,
                        "Build Successful",
                        format!("All modules built successfully in {}", elapsed),
                    )
                    .auto_hide_after(10_000),
                );
            }
            BuildPhase::Failed => {
                self.notifications.push(
                    NotificationDraft::new(
                        NotificationKind::Error,
                        "Build Failed",
                        format!("Build failed after {} with exit code {}", elapsed, exit_code),
                    )
                    .sticky(),
                );
            }
            // Stopped builds were already announced by `stop`
            _ => {}
        }

        if let Some((version, build_number, metrics)) = record {
            if let Err(e) = self.history.save_build_record(&version, build_number, metrics) {
                tracing::error!(error = %e, version = %version, "Failed to save build history");
            }
        }
    }
}
