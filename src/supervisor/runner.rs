use crate::error::{BuildcastError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Which pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line { stream: StreamKind, text: String },
    /// Always the last event; every line has been delivered before it
    Exited { code: i32 },
}

/// A fully resolved shell command ready to spawn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInvocation {
    pub command_line: String,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl BuildInvocation {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Default::default()
        }
    }
}

/// Best-effort handle for stopping a spawned process
pub trait ProcessControl: Send + Sync {
    /// Signal the process to terminate. Success means the signal was sent,
    /// not that the process is gone.
    fn terminate(&self) -> std::result::Result<(), String>;
}

pub struct SpawnedProcess {
    pub events: mpsc::Receiver<ProcessEvent>,
    pub control: Box<dyn ProcessControl>,
}

/// Starts build subprocesses. Must be called from within a tokio runtime.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, invocation: &BuildInvocation) -> Result<SpawnedProcess>;
}

/// Runs commands through `sh -c` in a fresh process group
pub struct ShellRunner {
    channel_capacity: usize,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl ProcessRunner for ShellRunner {
    fn spawn(&self, invocation: &BuildInvocation) -> Result<SpawnedProcess> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&invocation.command_line)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| BuildcastError::SpawnFailure {
            command: invocation.command_line.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();
        tracing::debug!(pid = ?pid, command = %invocation.command_line, "Build process spawned");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, StreamKind::Stdout, tx.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, StreamKind::Stderr, tx.clone())));

        tokio::spawn(async move {
            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = reader.await;
            }
            let code = match child.wait().await {
                Ok(status) => exit_code(status),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to wait for build process");
                    -1
                }
            };
            let _ = tx.send(ProcessEvent::Exited { code }).await;
        });

        Ok(SpawnedProcess {
            events: rx,
            control: Box::new(ProcessGroup { pid }),
        })
    }
}

async fn forward_lines<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                if tx.send(ProcessEvent::Line { stream, text }).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(?stream, error = %e, "Error reading build output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessControl for ProcessGroup {
    #[cfg(unix)]
    fn terminate(&self) -> std::result::Result<(), String> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pid = self.pid.ok_or_else(|| "process already reaped".to_string())?;
        killpg(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| e.to_string())
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> std::result::Result<(), String> {
        Err("process group signals are not supported on this platform".to_string())
    }
}
