use super::classifier::{ClassifiedLine, LineEvent, TaskOutcome};
use super::progress;
use super::{
    pending_modules, BuildMeta, BuildPhase, BuildStatus, ModuleState, OutputLine, ProgressSource,
    TaskRecord, TaskState,
};
use crate::ring::BoundedQueue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Owner of the current [`BuildStatus`].
///
/// All mutation goes through these methods; callers serialize access (the
/// supervisor holds it behind a mutex) and broadcast after each call.
pub struct BuildAggregate {
    status: BuildStatus,
    log_capacity: usize,
}

impl BuildAggregate {
    pub fn new<S: AsRef<str>>(modules: &[S], log_capacity: usize) -> Self {
        Self {
            status: BuildStatus::idle(modules, log_capacity),
            log_capacity,
        }
    }

    /// Replace the whole status with a fresh record for a new build
    pub fn reset<S: AsRef<str>>(&mut self, modules: &[S], meta: BuildMeta) {
        let now = Utc::now();
        self.status = BuildStatus {
            build_id: Some(meta.build_id),
            phase: BuildPhase::Building,
            progress_percent: 0,
            progress_source: ProgressSource::Estimated,
            start_time: Some(now),
            end_time: None,
            exit_code: None,
            command: Some(meta.command),
            version: Some(meta.version),
            build_number: Some(meta.build_number),
            modules: pending_modules(modules, now),
            tasks: BTreeMap::new(),
            release_ready: false,
            release_in_progress: false,
            error: None,
            last_update: now,
            output_log: BoundedQueue::new(self.log_capacity),
            truncated_lines: 0,
        };
    }

    /// Apply one classified line and return the output entry that was logged.
    ///
    /// Once the phase is terminal a marker or progress line cannot change it,
    /// and a late line can never move the build back to `Building`. Task and
    /// module records keep updating, since a build-all script runs several
    /// Gradle invocations that each print their own marker.
    pub fn apply(&mut self, line: ClassifiedLine) -> OutputLine {
        let now = Utc::now();
        self.status.last_update = now;
        let terminal = self.status.phase.is_terminal();

        match line.event {
            LineEvent::BuildFailed if !terminal => {
                self.enter_terminal(BuildPhase::Failed, now, false)
            }
            LineEvent::BuildSucceeded if !terminal => {
                self.enter_terminal(BuildPhase::Success, now, false)
            }
            LineEvent::TaskStarted { module, task } => self.start_task(&module, &task, now),
            LineEvent::TaskFinished {
                module,
                task,
                outcome,
            } => self.finish_task(&module, &task, outcome, now),
            LineEvent::Progress { percent } if !terminal => {
                self.raise_progress(percent);
                self.status.progress_source = ProgressSource::Reported;
            }
            _ => {}
        }

        self.push_output(line.output.clone());
        line.output
    }

    /// Mark a task running when its completion line arrives for a module that
    /// has not started yet, so observers see `Building` before the module's
    /// final status. Returns whether anything changed.
    pub fn begin_implied_task(&mut self, line: &ClassifiedLine) -> bool {
        let LineEvent::TaskFinished { module, task, .. } = &line.event else {
            return false;
        };
        let pending = self
            .status
            .modules
            .get(module)
            .map(|m| m.status == ModuleState::Pending)
            .unwrap_or(false);
        if !pending {
            return false;
        }
        let now = Utc::now();
        self.start_task(module, task, now);
        self.status.last_update = now;
        true
    }

    /// Force the terminal phase after the process exited.
    ///
    /// A stopped build stays `Stopped`; only the exit code is recorded.
    pub fn finish(&mut self, exit_code: i32) -> BuildPhase {
        let now = Utc::now();
        if self.status.exit_code.is_none() {
            self.status.exit_code = Some(exit_code);
        }
        self.status.last_update = now;
        if self.status.phase == BuildPhase::Stopped {
            return BuildPhase::Stopped;
        }

        let phase = if exit_code == 0 {
            BuildPhase::Success
        } else {
            BuildPhase::Failed
        };
        self.enter_terminal(phase, now, true);
        if phase == BuildPhase::Success {
            self.settle_running(now);
        }
        phase
    }

    /// Flip to `Stopped` immediately. Returns false when there was nothing to stop.
    ///
    /// A marker-driven `Success` or `Failed` is overridden while the process is
    /// still alive: the user stopped it before it exited, so the exit code
    /// never gets to decide. Release readiness is only granted on exit.
    pub fn mark_stopped(&mut self) -> bool {
        if matches!(self.status.phase, BuildPhase::Idle | BuildPhase::Stopped) {
            return false;
        }
        let now = Utc::now();
        self.status.phase = BuildPhase::Stopped;
        self.status.progress_percent = 100;
        self.status.release_ready = false;
        if self.status.end_time.is_none() {
            self.status.end_time = Some(now);
        }
        self.status.last_update = now;
        true
    }

    /// Record a build that never started because the subprocess failed to spawn
    pub fn mark_spawn_failed(&mut self, error: &str) -> OutputLine {
        let now = Utc::now();
        self.status.error = Some(error.to_string());
        self.enter_terminal(BuildPhase::Failed, now, true);
        let line = OutputLine::error(format!("Failed to start build: {}", error));
        self.push_output(line.clone());
        line
    }

    /// Raise progress from elapsed time while no task-count summary has been seen
    pub fn advance_estimate(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.phase != BuildPhase::Building
            || self.status.progress_source != ProgressSource::Estimated
        {
            return false;
        }
        let Some(start) = self.status.start_time else {
            return false;
        };
        let elapsed = (now - start).num_milliseconds().max(0) as u64;
        let estimate = progress::estimate(elapsed);
        if estimate > self.status.progress_percent {
            self.status.progress_percent = estimate;
            self.status.last_update = now;
            true
        } else {
            false
        }
    }

    /// Log a line that did not come from the build tool
    pub fn append_output(&mut self, line: OutputLine) {
        self.status.last_update = Utc::now();
        self.push_output(line);
    }

    pub fn set_release_ready(&mut self, ready: bool) {
        self.status.release_ready = ready;
        self.status.last_update = Utc::now();
    }

    pub fn set_release_in_progress(&mut self, in_progress: bool) {
        self.status.release_in_progress = in_progress;
        self.status.last_update = Utc::now();
    }

    pub fn phase(&self) -> BuildPhase {
        self.status.phase
    }

    pub fn status(&self) -> &BuildStatus {
        &self.status
    }

    /// Deep copy of the full status including the output log
    pub fn snapshot(&self) -> BuildStatus {
        self.status.clone()
    }

    /// Copy without the output log, for per-line pushes
    pub fn status_view(&self) -> BuildStatus {
        self.status.without_output()
    }

    pub fn output(&self) -> Vec<OutputLine> {
        self.status.output_log.to_vec()
    }

    fn push_output(&mut self, line: OutputLine) {
        self.status.output_log.push(line);
        self.status.truncated_lines = self.status.output_log.evicted();
    }

    fn raise_progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.status.progress_percent {
            self.status.progress_percent = percent;
        }
    }

    fn enter_terminal(&mut self, phase: BuildPhase, now: DateTime<Utc>, close: bool) {
        self.status.phase = phase;
        self.status.progress_percent = 100;
        if close && self.status.end_time.is_none() {
            self.status.end_time = Some(now);
        }
    }

    fn start_task(&mut self, module: &str, task: &str, now: DateTime<Utc>) {
        if let Some(m) = self.status.modules.get_mut(module) {
            if matches!(m.status, ModuleState::Pending | ModuleState::Building) {
                m.status = ModuleState::Building;
            }
            m.current_task = Some(task.to_string());
            m.last_update = now;
        }

        let key = task_key(module, task);
        self.status
            .tasks
            .entry(key)
            .and_modify(|record| {
                record.status = TaskState::Running;
                record.start_time = now;
                record.end_time = None;
                record.outcome = None;
            })
            .or_insert_with(|| TaskRecord {
                module: module.to_string(),
                task: task.to_string(),
                status: TaskState::Running,
                start_time: now,
                end_time: None,
                outcome: None,
            });
    }

    fn finish_task(&mut self, module: &str, task: &str, outcome: TaskOutcome, now: DateTime<Utc>) {
        let task_state = if outcome.is_failure() {
            TaskState::Failed
        } else {
            TaskState::Success
        };

        let record = self
            .status
            .tasks
            .entry(task_key(module, task))
            .or_insert_with(|| TaskRecord {
                module: module.to_string(),
                task: task.to_string(),
                status: TaskState::Running,
                start_time: now,
                end_time: None,
                outcome: None,
            });
        record.status = task_state;
        record.end_time = Some(now);
        record.outcome = Some(outcome.as_str().to_string());

        if let Some(m) = self.status.modules.get_mut(module) {
            if m.status == ModuleState::Pending {
                m.status = ModuleState::Building;
            }
            if super::classifier::is_module_terminal_task(task) {
                // A failure wins over an earlier settled task; success never clears a failure
                if outcome.is_failure() {
                    m.status = ModuleState::Failed;
                } else if m.status == ModuleState::Building {
                    m.status = ModuleState::Success;
                }
            }
            m.current_task = Some(task.to_string());
            m.last_update = now;
        }
    }

    /// Tasks that ran to completion print no outcome; a successful exit settles them.
    fn settle_running(&mut self, now: DateTime<Utc>) {
        for record in self.status.tasks.values_mut() {
            if record.status == TaskState::Running {
                record.status = TaskState::Success;
                record.end_time = Some(now);
            }
        }
        for module in self.status.modules.values_mut() {
            if module.status == ModuleState::Building {
                module.status = ModuleState::Success;
                module.last_update = now;
            }
        }
    }
}

pub fn task_key(module: &str, task: &str) -> String {
    format!("{}:{}", module, task)
}
