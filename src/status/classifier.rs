//! Stateless classification of Gradle console output.
//!
//! Every line yields exactly one [`LineEvent`]. Checks run in a fixed order:
//! terminal build markers, task lines, the "actionable tasks" summary, and
//! finally plain output. Nothing here can fail; unknown text is plain output.

use super::{OutputKind, OutputLine};
use regex::Regex;
use std::sync::OnceLock;

const BUILD_FAILED_MARKER: &str = "BUILD FAILED";
const BUILD_SUCCESSFUL_MARKER: &str = "BUILD SUCCESSFUL";

/// Task names whose completion decides the owning module's status
const MODULE_TERMINAL_TASKS: &[&str] = &["build", "assemble"];

fn task_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"> Task :([\w-]+):(\w+)(?:\s+(UP-TO-DATE|FROM-CACHE|SKIPPED|FAILED|NO-SOURCE))?")
            .expect("valid regex")
    })
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+) actionable tasks?: (\d+) executed").expect("valid regex")
    })
}

/// Terminal outcome Gradle prints after a task name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    UpToDate,
    FromCache,
    Skipped,
    Failed,
    NoSource,
}

impl TaskOutcome {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "UP-TO-DATE" => Some(Self::UpToDate),
            "FROM-CACHE" => Some(Self::FromCache),
            "SKIPPED" => Some(Self::Skipped),
            "FAILED" => Some(Self::Failed),
            "NO-SOURCE" => Some(Self::NoSource),
            _ => None,
        }
    }

    pub fn is_failure(self) -> bool {
        self == Self::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpToDate => "UP-TO-DATE",
            Self::FromCache => "FROM-CACHE",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
            Self::NoSource => "NO-SOURCE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    BuildFailed,
    BuildSucceeded,
    TaskStarted {
        module: String,
        task: String,
    },
    TaskFinished {
        module: String,
        task: String,
        outcome: TaskOutcome,
    },
    /// Percentage of actionable tasks executed
    Progress {
        percent: u8,
    },
    Plain,
}

impl LineEvent {
    /// Whether a finished task settles its module's status
    pub fn completes_module(&self) -> bool {
        match self {
            Self::TaskFinished { task, .. } => is_module_terminal_task(task),
            _ => false,
        }
    }
}

/// A raw line together with its event and the output entry it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub event: LineEvent,
    pub output: OutputLine,
}

impl ClassifiedLine {
    /// Marks a line read from standard error; such lines are logged as errors.
    pub fn from_stderr(mut self) -> Self {
        self.output.kind = OutputKind::Error;
        self
    }
}

pub fn is_module_terminal_task(task: &str) -> bool {
    MODULE_TERMINAL_TASKS.contains(&task)
}

/// Classify one line of build tool output
pub fn classify(line: &str) -> ClassifiedLine {
    let text = line.trim_end_matches(['\r', '\n']);
    ClassifiedLine {
        event: classify_event(text),
        output: OutputLine::new(output_kind(text), text),
    }
}

fn classify_event(text: &str) -> LineEvent {
    if text.contains(BUILD_FAILED_MARKER) {
        return LineEvent::BuildFailed;
    }
    if text.contains(BUILD_SUCCESSFUL_MARKER) {
        return LineEvent::BuildSucceeded;
    }

    if let Some(caps) = task_regex().captures(text) {
        let module = caps[1].to_string();
        let task = caps[2].to_string();
        return match caps.get(3).and_then(|m| TaskOutcome::parse(m.as_str())) {
            Some(outcome) => LineEvent::TaskFinished {
                module,
                task,
                outcome,
            },
            None => LineEvent::TaskStarted { module, task },
        };
    }

    if let Some(caps) = progress_regex().captures(text) {
        let total: u64 = caps[1].parse().unwrap_or(0);
        let executed: u64 = caps[2].parse().unwrap_or(0);
        if total > 0 {
            let percent = (executed.saturating_mul(100) / total).min(100) as u8;
            return LineEvent::Progress { percent };
        }
    }

    LineEvent::Plain
}

fn output_kind(text: &str) -> OutputKind {
    if text.contains("ERROR") || text.contains("FAILED") {
        OutputKind::Error
    } else if text.contains("SUCCESS") || text.to_lowercase().contains("build successful") {
        OutputKind::Success
    } else {
        OutputKind::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_start() {
        let line = classify("> Task :core:compileJava");
        assert_eq!(
            line.event,
            LineEvent::TaskStarted {
                module: "core".to_string(),
                task: "compileJava".to_string()
            }
        );
        assert_eq!(line.output.kind, OutputKind::Info);
    }

    #[test]
    fn test_task_outcomes() {
        let cases = [
            ("UP-TO-DATE", TaskOutcome::UpToDate),
            ("FROM-CACHE", TaskOutcome::FromCache),
            ("SKIPPED", TaskOutcome::Skipped),
            ("FAILED", TaskOutcome::Failed),
            ("NO-SOURCE", TaskOutcome::NoSource),
        ];
        for (keyword, expected) in cases {
            let line = classify(&format!("> Task :power:jar {}", keyword));
            match line.event {
                LineEvent::TaskFinished {
                    module,
                    task,
                    outcome,
                } => {
                    assert_eq!(module, "power");
                    assert_eq!(task, "jar");
                    assert_eq!(outcome, expected);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_failed_task_is_error_output() {
        let line = classify("> Task :core:build FAILED");
        assert!(line.event.completes_module());
        assert_eq!(line.output.kind, OutputKind::Error);
    }

    #[test]
    fn test_module_terminal_tasks() {
        assert!(classify("> Task :core:assemble UP-TO-DATE")
            .event
            .completes_module());
        assert!(!classify("> Task :core:jar UP-TO-DATE")
            .event
            .completes_module());
        assert!(!classify("> Task :core:build").event.completes_module());
    }

    #[test]
    fn test_progress_hint() {
        let line = classify("42 actionable tasks: 10 executed");
        assert_eq!(line.event, LineEvent::Progress { percent: 23 });

        let line = classify("1 actionable task: 1 executed");
        assert_eq!(line.event, LineEvent::Progress { percent: 100 });

        let line = classify("42 actionable tasks: 10 executed, 32 up-to-date");
        assert_eq!(line.event, LineEvent::Progress { percent: 23 });
    }

    #[test]
    fn test_progress_hint_with_zero_total_is_plain() {
        assert_eq!(
            classify("0 actionable tasks: 0 executed").event,
            LineEvent::Plain
        );
    }

    #[test]
    fn test_terminal_markers_win_over_other_patterns() {
        assert_eq!(classify("BUILD FAILED in 3s").event, LineEvent::BuildFailed);
        assert_eq!(
            classify("BUILD SUCCESSFUL in 12s").event,
            LineEvent::BuildSucceeded
        );
        assert_eq!(
            classify("> Task :core:build BUILD FAILED").event,
            LineEvent::BuildFailed
        );
    }

    #[test]
    fn test_plain_output_kinds() {
        assert_eq!(classify("Compiling sources").output.kind, OutputKind::Info);
        assert_eq!(
            classify("ERROR: something broke").output.kind,
            OutputKind::Error
        );
        assert_eq!(
            classify("Build successful, nice").output.kind,
            OutputKind::Success
        );
        assert_eq!(classify("").event, LineEvent::Plain);
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        let line = classify("hello\r\n");
        assert_eq!(line.output.message, "hello");
    }

    #[test]
    fn test_stderr_lines_are_errors() {
        let line = classify("warning: deprecated API").from_stderr();
        assert_eq!(line.output.kind, OutputKind::Error);
        assert_eq!(line.event, LineEvent::Plain);
    }
}
