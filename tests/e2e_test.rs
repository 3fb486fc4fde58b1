#![cfg(unix)]

use buildcast::dashboard::{BroadcastHub, ChannelObserver, NotificationCenter, ServerMessage};
use buildcast::history::{HistoryStore, SqliteHistoryStore};
use buildcast::status::{BuildPhase, ModuleState, OutputKind, TaskState};
use buildcast::supervisor::{BuildSupervisor, CommandResolver, ShellRunner, SupervisorConfig};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const FAKE_GRADLE: &str = r#"#!/bin/sh
echo "> Task :core:compileJava"
echo "> Task :core:build UP-TO-DATE"
echo "> Task :power:compileJava"
echo "> Task :power:build"
echo "warning: deprecated API" 1>&2
echo "4 actionable tasks: 2 executed, 2 up-to-date"
echo "BUILD SUCCESSFUL in 1s"
"#;

fn build_supervisor(
    project: &std::path::Path,
    history: Arc<dyn HistoryStore>,
    max_build_duration: Option<Duration>,
) -> Arc<BuildSupervisor> {
    let hub = Arc::new(BroadcastHub::new());
    let notifications = NotificationCenter::new(hub.clone());
    let mut resolver = CommandResolver::new(project);
    resolver.gradle_wrapper = "sh ./gradlew".to_string();
    BuildSupervisor::new(
        SupervisorConfig {
            modules: vec!["core".to_string(), "power".to_string(), "space".to_string()],
            output_log_capacity: 1000,
            max_build_duration,
            counter_path: project.join(".build_counter"),
        },
        resolver,
        Arc::new(ShellRunner::new()),
        history,
        hub,
        notifications,
    )
}

async fn wait_for_exit(sup: &BuildSupervisor) {
    for _ in 0..500 {
        if !sup.is_running() && sup.snapshot().exit_code.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("build did not finish");
}

#[tokio::test]
async fn test_end_to_end_gradle_build() {
    // 1. Fake Gradle wrapper inside a temporary project
    let project = tempdir().expect("Failed to create project dir");
    fs::write(project.path().join("gradlew"), FAKE_GRADLE).unwrap();
    let history = Arc::new(SqliteHistoryStore::in_memory(50).unwrap());
    let sup = build_supervisor(project.path(), history.clone(), None);

    // 2. Watch from before the build starts
    let (observer, mut rx) = ChannelObserver::channel(1024);
    sup.subscribe(Arc::new(observer));

    sup.start(Some(":core:build :power:build")).expect("start failed");
    wait_for_exit(&sup).await;

    // 3. Final status reflects the whole run
    let status = sup.snapshot();
    assert_eq!(status.phase, BuildPhase::Success);
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.modules["core"].status, ModuleState::Success);
    assert_eq!(status.modules["power"].status, ModuleState::Success);
    assert_eq!(status.modules["space"].status, ModuleState::Pending);
    assert_eq!(status.tasks["power:compileJava"].status, TaskState::Success);
    assert!(status.release_ready);
    assert!(status
        .output_log
        .iter()
        .any(|l| l.kind == OutputKind::Error && l.message == "warning: deprecated API"));

    // 4. Observer got the snapshot first and per-line deltas after it
    let mut messages = Vec::new();
    while let Ok(m) = rx.try_recv() {
        messages.push(m);
    }
    assert!(matches!(*messages[0], ServerMessage::Status(_)));
    let deltas = messages
        .iter()
        .filter(|m| matches!(***m, ServerMessage::BuildOutput(_)))
        .count();
    assert!(deltas >= 7);

    // 5. Successful build was persisted
    let records = history.load_recent_history().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].build_metrics.module_statuses["core"], ModuleState::Success);
}

#[tokio::test]
async fn test_end_to_end_stop_long_build() {
    let project = tempdir().expect("Failed to create project dir");
    fs::write(
        project.path().join("gradlew"),
        "#!/bin/sh\necho \"> Task :core:compileJava\"\nsleep 30\n",
    )
    .unwrap();
    let history = Arc::new(SqliteHistoryStore::in_memory(50).unwrap());
    let sup = build_supervisor(project.path(), history.clone(), Some(Duration::from_millis(300)));

    sup.start(None).expect("start failed");
    wait_for_exit(&sup).await;

    let status = sup.snapshot();
    assert_eq!(status.phase, BuildPhase::Stopped);
    assert_ne!(status.exit_code, Some(0));
    assert!(history.load_recent_history().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_wrapper_fails_build() {
    let project = tempdir().expect("Failed to create project dir");
    let history = Arc::new(SqliteHistoryStore::in_memory(50).unwrap());
    let sup = build_supervisor(project.path(), history, None);

    // The shell starts fine; the wrapper it runs does not exist
    sup.start(None).expect("start failed");
    wait_for_exit(&sup).await;

    let status = sup.snapshot();
    assert_eq!(status.phase, BuildPhase::Failed);
    assert!(!status.release_ready);
}
