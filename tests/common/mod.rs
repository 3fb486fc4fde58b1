#![allow(dead_code)]

use buildcast::dashboard::{BroadcastHub, NotificationCenter, ServerMessage};
use buildcast::history::JsonHistoryStore;
use buildcast::supervisor::{
    BuildInvocation, BuildSupervisor, CommandResolver, ProcessControl, ProcessEvent,
    ProcessRunner, SpawnedProcess, SupervisorConfig,
};
use buildcast::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Runner whose processes are driven by the test through channel senders
#[derive(Default)]
pub struct ScriptedRunner {
    senders: Mutex<Vec<mpsc::Sender<ProcessEvent>>>,
    invocations: Mutex<Vec<BuildInvocation>>,
    terminations: Arc<AtomicUsize>,
}

struct ScriptedControl {
    terminations: Arc<AtomicUsize>,
}

impl ProcessControl for ScriptedControl {
    fn terminate(&self) -> std::result::Result<(), String> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ProcessRunner for ScriptedRunner {
    fn spawn(&self, invocation: &BuildInvocation) -> Result<SpawnedProcess> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().push(tx);
        self.invocations.lock().push(invocation.clone());
        Ok(SpawnedProcess {
            events: rx,
            control: Box::new(ScriptedControl {
                terminations: self.terminations.clone(),
            }),
        })
    }
}

impl ScriptedRunner {
    /// Sender for the `n`th spawned process
    pub fn process(&self, n: usize) -> mpsc::Sender<ProcessEvent> {
        self.senders.lock()[n].clone()
    }

    pub async fn line(&self, n: usize, text: &str) {
        self.process(n)
            .send(ProcessEvent::Line {
                stream: buildcast::supervisor::StreamKind::Stdout,
                text: text.to_string(),
            })
            .await
            .expect("driver gone");
    }

    pub async fn exit(&self, n: usize, code: i32) {
        self.process(n)
            .send(ProcessEvent::Exited { code })
            .await
            .expect("driver gone");
    }

    pub fn invocations(&self) -> Vec<BuildInvocation> {
        self.invocations.lock().clone()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

pub fn config(dir: &Path) -> SupervisorConfig {
    SupervisorConfig {
        modules: vec!["core".to_string(), "power".to_string()],
        output_log_capacity: 500,
        max_build_duration: None,
        counter_path: dir.join(".build_counter"),
    }
}

pub fn supervisor(
    dir: &Path,
    config: SupervisorConfig,
    runner: Arc<ScriptedRunner>,
) -> Arc<BuildSupervisor> {
    let hub = Arc::new(BroadcastHub::new());
    let notifications = NotificationCenter::new(hub.clone());
    BuildSupervisor::new(
        config,
        CommandResolver::new(dir),
        runner,
        Arc::new(JsonHistoryStore::new(dir.join("version_history.json"), 50)),
        hub,
        notifications,
    )
}

/// Poll until `condition` holds, failing the test after two seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    wait_until_for(condition, Duration::from_secs(2)).await
}

pub async fn wait_until_for<F: Fn() -> bool>(condition: F, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {:?}", limit);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn drain(rx: &mut mpsc::Receiver<Arc<ServerMessage>>) -> Vec<Arc<ServerMessage>> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}
